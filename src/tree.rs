//! Owned element trees.
//!
//! Header elements, fault details and cached payloads are kept as small
//! element trees that can be rebuilt from, and turned back into, events.

use crate::error::XmlStreamError;
use crate::event::{Attribute, Namespace, QName, XmlEvent};
use crate::reader::{skip_ignorable, BufferedEventReader, EventReader};

/// Child node of an element.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
}

/// An XML element with its subtree.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: QName,
    pub attributes: Vec<Attribute>,
    pub namespaces: Vec<Namespace>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: QName) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            namespaces: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Element holding a single text node.
    pub fn with_text(name: QName, text: impl Into<String>) -> Self {
        let mut element = Self::new(name);
        element.children.push(Node::Text(text.into()));
        element
    }

    pub fn name(&self) -> &QName {
        &self.name
    }

    pub fn attribute(&self, name: &QName) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| &a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Set or replace an attribute.
    pub fn set_attribute(&mut self, name: QName, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = value,
            None => self.attributes.push(Attribute::new(name, value)),
        }
    }

    pub fn remove_attribute(&mut self, name: &QName) -> Option<String> {
        let index = self.attributes.iter().position(|a| &a.name == name)?;
        Some(self.attributes.remove(index).value)
    }

    pub fn declare_namespace(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        self.namespaces.push(Namespace::new(prefix, uri));
    }

    /// Append a child element and return it.
    pub fn add_child(&mut self, child: Element) -> &mut Element {
        self.children.push(Node::Element(child));
        match self.children.last_mut() {
            Some(Node::Element(element)) => element,
            _ => unreachable!("an element was just pushed"),
        }
    }

    pub fn add_text(&mut self, text: impl Into<String>) {
        self.children.push(Node::Text(text.into()));
    }

    /// Replace all children with a single text node.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children.clear();
        self.children.push(Node::Text(text.into()));
    }

    /// Concatenated direct text and CDATA content.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) | Node::CData(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    pub fn child(&self, name: &QName) -> Option<&Element> {
        self.child_elements().find(|e| &e.name == name)
    }

    pub fn child_mut(&mut self, name: &QName) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|node| match node {
            Node::Element(element) if &element.name == name => Some(element),
            _ => None,
        })
    }

    pub fn children_named<'a>(&'a self, name: &'a QName) -> impl Iterator<Item = &'a Element> {
        self.child_elements().filter(move |e| &e.name == name)
    }

    /// Read the next element subtree from `reader`.
    ///
    /// Document markers, whitespace and comments before the element are skipped.
    pub fn read_from<R: EventReader + ?Sized>(reader: &mut R) -> Result<Element, XmlStreamError> {
        loop {
            skip_ignorable(reader)?;
            match reader.peek()? {
                Some(XmlEvent::StartDocument) => {
                    reader.next_event()?;
                }
                Some(XmlEvent::StartElement { .. }) => break,
                Some(other) => {
                    return Err(XmlStreamError::Malformed(format!(
                        "expected start element, found {:?}",
                        other
                    )))
                }
                None => return Err(XmlStreamError::UnexpectedEnd),
            }
        }
        let start = reader.next_event()?;
        Self::build(start, reader)
    }

    /// Build the subtree opened by `start`, consuming events up to its end element.
    pub fn build<R: EventReader + ?Sized>(
        start: XmlEvent,
        reader: &mut R,
    ) -> Result<Element, XmlStreamError> {
        let mut stack = vec![Self::from_start(start)?];
        loop {
            match reader.next_event()? {
                start @ XmlEvent::StartElement { .. } => stack.push(Self::from_start(start)?),
                XmlEvent::EndElement { name } => {
                    let finished = stack.pop().ok_or(XmlStreamError::UnexpectedEnd)?;
                    if finished.name != name {
                        return Err(XmlStreamError::Malformed(format!(
                            "end element {} does not match {}",
                            name, finished.name
                        )));
                    }
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Element(finished)),
                        None => return Ok(finished),
                    }
                }
                XmlEvent::Characters(text) => push_node(&mut stack, Node::Text(text)),
                XmlEvent::CData(text) => push_node(&mut stack, Node::CData(text)),
                XmlEvent::Comment(text) => push_node(&mut stack, Node::Comment(text)),
                XmlEvent::StartDocument => {}
                XmlEvent::EndDocument => return Err(XmlStreamError::UnexpectedEnd),
            }
        }
    }

    fn from_start(event: XmlEvent) -> Result<Element, XmlStreamError> {
        match event {
            XmlEvent::StartElement {
                name,
                attributes,
                namespaces,
            } => Ok(Element {
                name,
                attributes,
                namespaces,
                children: Vec::new(),
            }),
            other => Err(XmlStreamError::Malformed(format!(
                "expected start element, found {:?}",
                other
            ))),
        }
    }

    /// Append the events of this subtree to `out`.
    pub fn write_events(&self, out: &mut Vec<XmlEvent>) {
        out.push(XmlEvent::StartElement {
            name: self.name.clone(),
            attributes: self.attributes.clone(),
            namespaces: self.namespaces.clone(),
        });
        for child in &self.children {
            match child {
                Node::Element(element) => element.write_events(out),
                Node::Text(text) => out.push(XmlEvent::Characters(text.clone())),
                Node::CData(text) => out.push(XmlEvent::CData(text.clone())),
                Node::Comment(text) => out.push(XmlEvent::Comment(text.clone())),
            }
        }
        out.push(XmlEvent::EndElement {
            name: self.name.clone(),
        });
    }

    pub fn to_events(&self) -> Vec<XmlEvent> {
        let mut events = Vec::new();
        self.write_events(&mut events);
        events
    }

    /// Fragment reader over this subtree, terminated by an end-of-document event.
    pub fn event_reader(&self) -> BufferedEventReader {
        BufferedEventReader::fragment(self.to_events())
    }
}

fn push_node(stack: &mut [Element], node: Node) {
    if let Some(current) = stack.last_mut() {
        current.children.push(node);
    }
}
