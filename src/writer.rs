//! Namespace-repairing serialization of XML events.

use crate::error::XmlStreamError;
use crate::event::{Attribute, Namespace, NamespaceScope, QName, XmlEvent};
use crate::reader::EventReader;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Write;

/// Settings applied to every event writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterSettings {
    /// Emit `<?xml version="1.0" encoding="UTF-8"?>` on start of document
    pub write_declaration: bool,
    /// Indentation width; `None` writes everything on one line
    pub indent: Option<usize>,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            write_declaration: true,
            indent: None,
        }
    }
}

/// Writes [`XmlEvent`]s as XML text.
///
/// Namespace declarations missing from the events are added where an
/// element or attribute name needs them, so fragments cut out of a larger
/// document serialize correctly.
pub struct EventWriter<W: Write> {
    writer: Writer<W>,
    settings: WriterSettings,
    scope: NamespaceScope,
    open: Vec<String>,
    generated: usize,
    declaration_written: bool,
}

impl<W: Write> EventWriter<W> {
    pub fn new(out: W) -> Self {
        Self::with_settings(out, WriterSettings::default())
    }

    pub fn with_settings(out: W, settings: WriterSettings) -> Self {
        let writer = match settings.indent {
            Some(width) => Writer::new_with_indent(out, b' ', width),
            None => Writer::new(out),
        };
        Self {
            writer,
            settings,
            scope: NamespaceScope::new(),
            open: Vec::new(),
            generated: 0,
            declaration_written: false,
        }
    }

    /// Write a single event.
    pub fn add(&mut self, event: &XmlEvent) -> Result<(), XmlStreamError> {
        match event {
            XmlEvent::StartDocument => {
                if self.settings.write_declaration && !self.declaration_written {
                    self.declaration_written = true;
                    self.writer
                        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
                }
            }
            XmlEvent::EndDocument => {
                if !self.open.is_empty() {
                    return Err(XmlStreamError::Malformed(format!(
                        "end of document with {} open element(s)",
                        self.open.len()
                    )));
                }
                self.writer.get_mut().flush()?;
            }
            XmlEvent::StartElement {
                name,
                attributes,
                namespaces,
            } => self.start_element(name, attributes, namespaces)?,
            XmlEvent::EndElement { name } => {
                let qualified = self.open.pop().ok_or_else(|| {
                    XmlStreamError::Malformed(format!("unbalanced end element {}", name))
                })?;
                self.scope.pop();
                self.writer.write_event(Event::End(BytesEnd::new(qualified)))?;
            }
            XmlEvent::Characters(text) => {
                self.writer.write_event(Event::Text(BytesText::new(text)))?;
            }
            XmlEvent::CData(text) => {
                // `]]>` cannot appear inside a section, so it is split across two
                let mut rest = text.as_str();
                while let Some(at) = rest.find("]]>") {
                    let (head, tail) = rest.split_at(at + 2);
                    self.writer.write_event(Event::CData(BytesCData::new(head)))?;
                    rest = tail;
                }
                self.writer.write_event(Event::CData(BytesCData::new(rest)))?;
            }
            XmlEvent::Comment(text) => {
                if text.contains("--") || text.ends_with('-') {
                    return Err(XmlStreamError::Malformed(format!(
                        "comment '{}' cannot be written: it contains '--' or ends with '-'",
                        text
                    )));
                }
                self.writer
                    .write_event(Event::Comment(BytesText::from_escaped(text.as_str())))?;
            }
        }
        Ok(())
    }

    /// Drain a reader into the output.
    pub fn add_all<R: EventReader + ?Sized>(&mut self, reader: &mut R) -> Result<(), XmlStreamError> {
        while reader.has_next() {
            let event = reader.next_event()?;
            self.add(&event)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), XmlStreamError> {
        self.writer.get_mut().flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn start_element(
        &mut self,
        name: &QName,
        attributes: &[Attribute],
        namespaces: &[Namespace],
    ) -> Result<(), XmlStreamError> {
        // declarations already in effect with the same binding are dropped
        let mut declared: Vec<Namespace> = namespaces
            .iter()
            .filter(|ns| !self.scope.is_bound(&ns.prefix, &ns.uri))
            .cloned()
            .collect();
        self.scope.push(&declared);

        let element_prefix = self.element_prefix(name, &mut declared);

        let mut attribute_names = Vec::with_capacity(attributes.len());
        for attribute in attributes {
            let prefix = self.attribute_prefix(&attribute.name, &mut declared);
            attribute_names.push(qualify(&prefix, attribute.name.local_part()));
        }

        let qualified = qualify(&element_prefix, name.local_part());
        let mut start = BytesStart::new(qualified.clone());
        for ns in &declared {
            if ns.prefix.is_empty() {
                start.push_attribute(("xmlns", ns.uri.as_str()));
            } else {
                let key = format!("xmlns:{}", ns.prefix);
                start.push_attribute((key.as_str(), ns.uri.as_str()));
            }
        }
        for (attribute, key) in attributes.iter().zip(&attribute_names) {
            start.push_attribute((key.as_str(), attribute.value.as_str()));
        }

        self.writer.write_event(Event::Start(start))?;
        self.open.push(qualified);
        Ok(())
    }

    fn element_prefix(&mut self, name: &QName, declared: &mut Vec<Namespace>) -> String {
        let uri = name.namespace();
        let wanted = name.prefix();
        if self.scope.is_bound(wanted, uri) {
            return wanted.to_string();
        }
        if !uri.is_empty() {
            if let Some(existing) = self.scope.prefix_for(uri) {
                return existing.to_string();
            }
        }
        // empty namespace needs an undeclared default, which requires an empty prefix
        let prefix = if uri.is_empty() { "" } else { wanted };
        self.bind(prefix, uri, declared);
        prefix.to_string()
    }

    fn attribute_prefix(&mut self, name: &QName, declared: &mut Vec<Namespace>) -> String {
        let uri = name.namespace();
        if uri.is_empty() {
            return String::new();
        }
        if let Some(existing) = self.scope.prefix_for(uri).filter(|p| !p.is_empty()) {
            return existing.to_string();
        }
        let wanted = name.prefix();
        let prefix = if !wanted.is_empty() && self.scope.uri_for(wanted).is_none() {
            wanted.to_string()
        } else {
            self.generate_prefix()
        };
        self.bind(&prefix, uri, declared);
        prefix
    }

    fn bind(&mut self, prefix: &str, uri: &str, declared: &mut Vec<Namespace>) {
        let namespace = Namespace::new(prefix, uri);
        self.scope.declare(namespace.clone());
        declared.push(namespace);
    }

    fn generate_prefix(&mut self) -> String {
        loop {
            let candidate = format!("ns{}", self.generated);
            self.generated += 1;
            if self.scope.uri_for(&candidate).is_none() {
                return candidate;
            }
        }
    }
}

fn qualify(prefix: &str, local: &str) -> String {
    if prefix.is_empty() {
        local.to_string()
    } else {
        format!("{}:{}", prefix, local)
    }
}

/// Serialize events to a string without an XML declaration.
pub fn events_to_string<'e>(
    events: impl IntoIterator<Item = &'e XmlEvent>,
) -> Result<String, XmlStreamError> {
    let mut writer = EventWriter::with_settings(
        Vec::new(),
        WriterSettings {
            write_declaration: false,
            indent: None,
        },
    );
    for event in events {
        writer.add(event)?;
    }
    String::from_utf8(writer.into_inner())
        .map_err(|e| XmlStreamError::Malformed(format!("writer produced invalid UTF-8: {}", e)))
}
