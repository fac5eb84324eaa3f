//! Pull-based XML event readers.
//!
//! Uses quick-xml's namespace-aware reader, which never expands external
//! entities. DOCTYPE declarations are rejected outright.

use crate::error::XmlStreamError;
use crate::event::{Attribute, Namespace, QName, XmlEvent};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use std::collections::VecDeque;
use std::io::BufRead;

/// A cursor over a sequence of XML events.
///
/// A well-formed document stream starts with [`XmlEvent::StartDocument`] and
/// ends with exactly one [`XmlEvent::EndDocument`]; fragment streams may omit
/// the start but still end with the end-of-document marker.
pub trait EventReader {
    /// Whether another event is available. Parse failures are reported by the
    /// following [`next_event`](Self::next_event) call, so this returns `true`
    /// when a failure is pending.
    fn has_next(&mut self) -> bool;

    /// Consume and return the next event.
    fn next_event(&mut self) -> Result<XmlEvent, XmlStreamError>;

    /// Look at the next event without consuming it; `None` at the end.
    fn peek(&mut self) -> Result<Option<&XmlEvent>, XmlStreamError>;
}

impl<R: EventReader + ?Sized> EventReader for Box<R> {
    fn has_next(&mut self) -> bool {
        (**self).has_next()
    }

    fn next_event(&mut self) -> Result<XmlEvent, XmlStreamError> {
        (**self).next_event()
    }

    fn peek(&mut self) -> Result<Option<&XmlEvent>, XmlStreamError> {
        (**self).peek()
    }
}

impl<R: EventReader + ?Sized> EventReader for &mut R {
    fn has_next(&mut self) -> bool {
        (**self).has_next()
    }

    fn next_event(&mut self) -> Result<XmlEvent, XmlStreamError> {
        (**self).next_event()
    }

    fn peek(&mut self) -> Result<Option<&XmlEvent>, XmlStreamError> {
        (**self).peek()
    }
}

/// Drain every remaining event of a reader.
pub fn collect_events<R: EventReader + ?Sized>(
    reader: &mut R,
) -> Result<Vec<XmlEvent>, XmlStreamError> {
    let mut events = Vec::new();
    while reader.has_next() {
        events.push(reader.next_event()?);
    }
    Ok(events)
}

/// Skip whitespace and comments, leaving the reader on the next significant event.
pub fn skip_ignorable<R: EventReader + ?Sized>(reader: &mut R) -> Result<(), XmlStreamError> {
    while let Some(event) = reader.peek()? {
        if !event.is_ignorable() {
            break;
        }
        reader.next_event()?;
    }
    Ok(())
}

/// Skip document start markers as well as whitespace and comments.
pub fn skip_to_content<R: EventReader + ?Sized>(reader: &mut R) -> Result<(), XmlStreamError> {
    loop {
        skip_ignorable(reader)?;
        match reader.peek()? {
            Some(event) if event.is_start_document() => {
                reader.next_event()?;
            }
            _ => return Ok(()),
        }
    }
}

/// Settings applied to every quick-xml reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderSettings {
    /// Trim whitespace around text and drop whitespace-only text
    pub trim_text: bool,
    /// Verify that end tags match their start tags
    pub check_end_names: bool,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            trim_text: false,
            check_end_names: true,
        }
    }
}

/// [`EventReader`] over raw XML bytes.
pub struct QuickXmlEventReader<R: BufRead> {
    reader: NsReader<R>,
    buf: Vec<u8>,
    pending: VecDeque<XmlEvent>,
    error: Option<XmlStreamError>,
    started: bool,
    finished: bool,
}

impl<R: BufRead> QuickXmlEventReader<R> {
    pub fn new(input: R) -> Self {
        Self::with_settings(input, ReaderSettings::default())
    }

    pub fn with_settings(input: R, settings: ReaderSettings) -> Self {
        let mut reader = NsReader::from_reader(input);
        reader.config_mut().trim_text(settings.trim_text);
        reader.config_mut().check_end_names = settings.check_end_names;
        Self {
            reader,
            buf: Vec::new(),
            pending: VecDeque::new(),
            error: None,
            started: false,
            finished: false,
        }
    }

    /// Make sure at least one event is pending unless the input is exhausted.
    fn fill(&mut self) -> Result<(), XmlStreamError> {
        if !self.pending.is_empty() || self.finished {
            return Ok(());
        }
        if !self.started {
            self.started = true;
            self.pending.push_back(XmlEvent::StartDocument);
            return Ok(());
        }

        while self.pending.is_empty() {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(ref e) => {
                    let start = start_element(&self.reader, e)?;
                    self.pending.push_back(start);
                }
                Event::Empty(ref e) => {
                    let start = start_element(&self.reader, e)?;
                    let name = start
                        .element_name()
                        .cloned()
                        .unwrap_or_default();
                    self.pending.push_back(start);
                    self.pending.push_back(XmlEvent::EndElement { name });
                }
                Event::End(ref e) => {
                    let (resolved, local) = self.reader.resolve_element(e.name());
                    let namespace = namespace_uri(resolved)?;
                    let prefix = e
                        .name()
                        .prefix()
                        .map(|p| std::str::from_utf8(p.as_ref()).map(str::to_string))
                        .transpose()?
                        .unwrap_or_default();
                    let local = std::str::from_utf8(local.as_ref())?;
                    self.pending.push_back(XmlEvent::EndElement {
                        name: QName::with_prefix(namespace, local, prefix),
                    });
                }
                Event::Text(ref e) => {
                    let text = e.unescape()?;
                    if !text.is_empty() {
                        self.pending.push_back(XmlEvent::Characters(text.into_owned()));
                    }
                }
                Event::CData(ref e) => {
                    let text = std::str::from_utf8(e)?;
                    self.pending.push_back(XmlEvent::CData(text.to_string()));
                }
                Event::Comment(ref e) => {
                    let text = std::str::from_utf8(e)?;
                    self.pending.push_back(XmlEvent::Comment(text.to_string()));
                }
                Event::DocType(_) => return Err(XmlStreamError::DoctypeNotAllowed),
                Event::Eof => {
                    self.finished = true;
                    self.pending.push_back(XmlEvent::EndDocument);
                }
                // Declarations and processing instructions carry nothing the message model uses
                _ => {}
            }
        }
        Ok(())
    }

    fn fill_recording_error(&mut self) {
        if self.error.is_none() {
            if let Err(e) = self.fill() {
                self.finished = true;
                self.error = Some(e);
            }
        }
    }
}

impl<R: BufRead> EventReader for QuickXmlEventReader<R> {
    fn has_next(&mut self) -> bool {
        self.fill_recording_error();
        self.error.is_some() || !self.pending.is_empty()
    }

    fn next_event(&mut self) -> Result<XmlEvent, XmlStreamError> {
        self.fill_recording_error();
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.pending.pop_front().ok_or(XmlStreamError::UnexpectedEnd)
    }

    fn peek(&mut self) -> Result<Option<&XmlEvent>, XmlStreamError> {
        self.fill_recording_error();
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        Ok(self.pending.front())
    }
}

fn namespace_uri(resolved: ResolveResult<'_>) -> Result<String, XmlStreamError> {
    match resolved {
        ResolveResult::Bound(ns) => Ok(std::str::from_utf8(ns.as_ref())?.to_string()),
        ResolveResult::Unbound => Ok(String::new()),
        ResolveResult::Unknown(prefix) => Err(XmlStreamError::Malformed(format!(
            "unknown namespace prefix '{}'",
            String::from_utf8_lossy(&prefix)
        ))),
    }
}

/// Convert a quick-xml start tag into an owned event with resolved names.
fn start_element<R>(reader: &NsReader<R>, e: &BytesStart<'_>) -> Result<XmlEvent, XmlStreamError> {
    let (resolved, local) = reader.resolve_element(e.name());
    let namespace = namespace_uri(resolved)?;
    let prefix = match e.name().prefix() {
        Some(p) => std::str::from_utf8(p.as_ref())?.to_string(),
        None => String::new(),
    };
    let name = QName::with_prefix(namespace, std::str::from_utf8(local.as_ref())?, prefix);

    let mut attributes = Vec::new();
    let mut namespaces = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())?;
        let value = attr.unescape_value()?.into_owned();
        if key == "xmlns" {
            namespaces.push(Namespace::new("", value));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            namespaces.push(Namespace::new(prefix, value));
        } else {
            let (resolved, local) = reader.resolve_attribute(attr.key);
            let namespace = namespace_uri(resolved)?;
            let prefix = match attr.key.prefix() {
                Some(p) => std::str::from_utf8(p.as_ref())?.to_string(),
                None => String::new(),
            };
            let local = std::str::from_utf8(local.as_ref())?;
            attributes.push(Attribute::new(
                QName::with_prefix(namespace, local, prefix),
                value,
            ));
        }
    }

    Ok(XmlEvent::StartElement {
        name,
        attributes,
        namespaces,
    })
}

/// [`EventReader`] over events held in memory.
#[derive(Debug, Clone, Default)]
pub struct BufferedEventReader {
    events: VecDeque<XmlEvent>,
}

impl BufferedEventReader {
    /// Events exactly as given.
    pub fn new(events: impl IntoIterator<Item = XmlEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
        }
    }

    /// Wrap the events in start/end document markers.
    pub fn document(events: impl IntoIterator<Item = XmlEvent>) -> Self {
        let mut reader = Self::new(std::iter::once(XmlEvent::StartDocument).chain(events));
        reader.events.push_back(XmlEvent::EndDocument);
        reader
    }

    /// Terminate the events with an end-of-document marker.
    pub fn fragment(events: impl IntoIterator<Item = XmlEvent>) -> Self {
        let mut reader = Self::new(events);
        reader.events.push_back(XmlEvent::EndDocument);
        reader
    }

    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl EventReader for BufferedEventReader {
    fn has_next(&mut self) -> bool {
        !self.events.is_empty()
    }

    fn next_event(&mut self) -> Result<XmlEvent, XmlStreamError> {
        self.events.pop_front().ok_or(XmlStreamError::UnexpectedEnd)
    }

    fn peek(&mut self) -> Result<Option<&XmlEvent>, XmlStreamError> {
        Ok(self.events.front())
    }
}

/// Reads the next element subtree of an inner reader, then ends the document.
///
/// Leading document markers, whitespace and comments are skipped. Events after the subtree are
/// left unread in the inner reader.
pub struct SubtreeReader<R> {
    inner: R,
    depth: usize,
    state: SubtreeState,
    end: Option<XmlEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubtreeState {
    Before,
    Inside,
    After,
    Done,
}

impl<R: EventReader> SubtreeReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            depth: 0,
            state: SubtreeState::Before,
            end: Some(XmlEvent::EndDocument),
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn locate_start(&mut self) -> Result<(), XmlStreamError> {
        if self.state != SubtreeState::Before {
            return Ok(());
        }
        skip_to_content(&mut self.inner)?;
        self.state = match self.inner.peek()? {
            Some(event) if event.is_start_element() => SubtreeState::Inside,
            _ => SubtreeState::After,
        };
        Ok(())
    }
}

impl<R: EventReader> EventReader for SubtreeReader<R> {
    fn has_next(&mut self) -> bool {
        match self.state {
            SubtreeState::Before | SubtreeState::Inside | SubtreeState::After => true,
            SubtreeState::Done => false,
        }
    }

    fn next_event(&mut self) -> Result<XmlEvent, XmlStreamError> {
        self.locate_start()?;
        match self.state {
            SubtreeState::Inside => {
                let event = self.inner.next_event()?;
                match &event {
                    XmlEvent::StartElement { .. } => self.depth += 1,
                    XmlEvent::EndElement { .. } => {
                        self.depth = self.depth.saturating_sub(1);
                        if self.depth == 0 {
                            self.state = SubtreeState::After;
                        }
                    }
                    XmlEvent::EndDocument => return Err(XmlStreamError::UnexpectedEnd),
                    _ => {}
                }
                Ok(event)
            }
            SubtreeState::After => {
                self.state = SubtreeState::Done;
                self.end.take().ok_or(XmlStreamError::UnexpectedEnd)
            }
            SubtreeState::Before | SubtreeState::Done => Err(XmlStreamError::UnexpectedEnd),
        }
    }

    fn peek(&mut self) -> Result<Option<&XmlEvent>, XmlStreamError> {
        self.locate_start()?;
        match self.state {
            SubtreeState::Inside => self.inner.peek(),
            SubtreeState::After => Ok(self.end.as_ref()),
            SubtreeState::Before | SubtreeState::Done => Ok(None),
        }
    }
}
