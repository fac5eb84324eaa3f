//! SOAP body: payload and fault handling.
//!
//! The payload of a parsed message is left in the input stream until somebody
//! asks for it. With payload caching enabled the first access materializes it
//! as an [`Element`] that later reads reuse; without caching the stream is
//! handed out once and a second access fails with
//! [`SoapError::PayloadConsumed`].

use crate::composite::CompositeEventReader;
use crate::error::{SoapError, XmlStreamError};
use crate::event::{Attribute, Namespace, QName, XmlEvent};
use crate::fault::SoapFault;
use crate::reader::{
    skip_ignorable, skip_to_content, BufferedEventReader, EventReader, SubtreeReader,
};
use crate::tree::Element;
use crate::version::SoapVersion;
use std::fmt;

/// Owned event source for payload content.
pub type PayloadSource = Box<dyn EventReader + Send>;

enum Payload {
    Empty,
    /// Input stream positioned at the payload start tag.
    Pending(PayloadSource),
    Tree(Element),
    Consumed,
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Pending(_) => f.write_str("Pending"),
            Self::Tree(element) => f.debug_tuple("Tree").field(&element.name).finish(),
            Self::Consumed => f.write_str("Consumed"),
        }
    }
}

/// The `Body` of an envelope. Holds either a payload or a fault, never both.
#[derive(Debug)]
pub struct SoapBody {
    version: SoapVersion,
    name: QName,
    attributes: Vec<Attribute>,
    namespaces: Vec<Namespace>,
    payload: Payload,
    fault: Option<SoapFault>,
    payload_caching: bool,
}

impl SoapBody {
    pub fn new(version: SoapVersion, payload_caching: bool) -> Self {
        Self {
            version,
            name: version.body_name(),
            attributes: Vec::new(),
            namespaces: Vec::new(),
            payload: Payload::Empty,
            fault: None,
            payload_caching,
        }
    }

    /// Body read from input; `content` is what followed the body start tag.
    pub(crate) fn parsed(
        version: SoapVersion,
        payload_caching: bool,
        start: (QName, Vec<Attribute>, Vec<Namespace>),
        content: BodyContent,
    ) -> Self {
        let (name, attributes, namespaces) = start;
        let (payload, fault) = match content {
            BodyContent::Empty => (Payload::Empty, None),
            BodyContent::Fault(fault) => (Payload::Empty, Some(fault)),
            BodyContent::Payload(stream) => (Payload::Pending(stream), None),
            BodyContent::Tree(element) => (Payload::Tree(element), None),
        };
        Self {
            version,
            name,
            attributes,
            namespaces,
            payload,
            fault,
            payload_caching,
        }
    }

    pub fn name(&self) -> &QName {
        &self.name
    }

    pub fn version(&self) -> SoapVersion {
        self.version
    }

    pub fn is_payload_caching(&self) -> bool {
        self.payload_caching
    }

    /// Whether a fault is the body's content.
    pub fn has_fault(&self) -> bool {
        self.fault.is_some()
    }

    pub fn fault(&self) -> Option<&SoapFault> {
        self.fault.as_ref()
    }

    pub fn fault_mut(&mut self) -> Option<&mut SoapFault> {
        self.fault.as_mut()
    }

    /// Whether the body has payload content that has not been consumed.
    pub fn has_payload(&self) -> bool {
        matches!(self.payload, Payload::Pending(_) | Payload::Tree(_))
    }

    /// Name of the payload root element, or the fault element name.
    ///
    /// Does not consume an uncached payload.
    pub fn payload_root_name(&mut self) -> Result<Option<QName>, SoapError> {
        if self.fault.is_some() {
            return Ok(Some(self.version.fault_name()));
        }
        match &mut self.payload {
            Payload::Empty => Ok(None),
            Payload::Tree(element) => Ok(Some(element.name.clone())),
            Payload::Pending(stream) => {
                skip_to_content(stream)?;
                Ok(stream.peek()?.and_then(XmlEvent::element_name).cloned())
            }
            Payload::Consumed => Err(SoapError::PayloadConsumed),
        }
    }

    /// Event reader over the body content, terminated by an end-of-document event.
    ///
    /// Returns `None` for an empty body. Without payload caching a streamed
    /// payload can be read this way once.
    pub fn payload_source(&mut self) -> Result<Option<PayloadSource>, SoapError> {
        if let Some(fault) = &self.fault {
            return Ok(Some(Box::new(fault.to_element().event_reader())));
        }
        if self.payload_caching {
            self.materialize()?;
        }
        match std::mem::replace(&mut self.payload, Payload::Consumed) {
            Payload::Empty => {
                self.payload = Payload::Empty;
                Ok(None)
            }
            Payload::Tree(element) => {
                let reader = element.event_reader();
                self.payload = Payload::Tree(element);
                Ok(Some(Box::new(reader)))
            }
            Payload::Pending(stream) => Ok(Some(Box::new(SubtreeReader::new(stream)))),
            Payload::Consumed => Err(SoapError::PayloadConsumed),
        }
    }

    /// The payload as an element tree.
    ///
    /// With caching the tree is kept and every call returns a copy of it;
    /// without caching a streamed payload is consumed by the first call.
    pub fn payload(&mut self) -> Result<Option<Element>, SoapError> {
        if let Some(fault) = &self.fault {
            return Ok(Some(fault.to_element()));
        }
        if self.payload_caching {
            self.materialize()?;
        }
        match std::mem::replace(&mut self.payload, Payload::Consumed) {
            Payload::Empty => {
                self.payload = Payload::Empty;
                Ok(None)
            }
            Payload::Tree(element) => {
                let copy = element.clone();
                self.payload = Payload::Tree(element);
                Ok(Some(copy))
            }
            Payload::Pending(stream) => read_subtree(stream).map_err(payload_error),
            Payload::Consumed => Err(SoapError::PayloadConsumed),
        }
    }

    /// The cached payload tree, if the payload has been materialized or set.
    pub fn cached_payload(&self) -> Option<&Element> {
        match &self.payload {
            Payload::Tree(element) => Some(element),
            _ => None,
        }
    }

    /// Replace the body content with `element`, removing any fault.
    pub fn set_payload(&mut self, element: Element) {
        self.fault = None;
        self.payload = Payload::Tree(element);
    }

    /// Replace the body content with the first element read from `source`.
    pub fn set_payload_source(&mut self, source: PayloadSource) {
        self.fault = None;
        self.payload = Payload::Pending(source);
    }

    /// Remove payload and fault.
    pub fn clear(&mut self) {
        self.fault = None;
        self.payload = Payload::Empty;
    }

    pub fn add_client_or_sender_fault(
        &mut self,
        reason: impl Into<String>,
        locale: Option<&str>,
    ) -> &mut SoapFault {
        let code = self.version.client_or_sender_fault_name();
        self.install_fault(code, reason.into(), locale)
    }

    pub fn add_server_or_receiver_fault(
        &mut self,
        reason: impl Into<String>,
        locale: Option<&str>,
    ) -> &mut SoapFault {
        let code = self.version.server_or_receiver_fault_name();
        self.install_fault(code, reason.into(), locale)
    }

    pub fn add_must_understand_fault(
        &mut self,
        reason: impl Into<String>,
        locale: Option<&str>,
    ) -> &mut SoapFault {
        let code = self.version.must_understand_fault_name();
        self.install_fault(code, reason.into(), locale)
    }

    pub fn add_version_mismatch_fault(
        &mut self,
        reason: impl Into<String>,
        locale: Option<&str>,
    ) -> &mut SoapFault {
        let code = self.version.version_mismatch_fault_name();
        self.install_fault(code, reason.into(), locale)
    }

    /// Add a fault with an arbitrary code.
    ///
    /// SOAP 1.1 accepts any namespace qualified code. SOAP 1.2 only allows the
    /// codes it defines at the top level; application codes go into subcodes.
    pub fn add_fault(
        &mut self,
        code: QName,
        reason: impl Into<String>,
        locale: Option<&str>,
    ) -> Result<&mut SoapFault, SoapError> {
        match self.version {
            SoapVersion::Soap11 if !code.has_namespace() => {
                return Err(SoapError::InvalidFaultDefinition(format!(
                    "fault code '{}' must be namespace qualified",
                    code.local_part()
                )))
            }
            SoapVersion::Soap12 if !self.version.is_standard_fault_code(&code) => {
                return Err(SoapError::InvalidFaultDefinition(format!(
                    "'{}' is not a SOAP 1.2 fault code",
                    code
                )))
            }
            _ => {}
        }
        Ok(self.install_fault(code, reason.into(), locale))
    }

    fn install_fault(&mut self, code: QName, reason: String, locale: Option<&str>) -> &mut SoapFault {
        self.payload = Payload::Empty;
        self.fault
            .insert(SoapFault::new(self.version, code, reason, locale))
    }

    fn materialize(&mut self) -> Result<(), SoapError> {
        if !matches!(self.payload, Payload::Pending(_)) {
            return Ok(());
        }
        if let Payload::Pending(stream) = std::mem::replace(&mut self.payload, Payload::Consumed) {
            self.payload = match read_subtree(stream).map_err(payload_error)? {
                Some(element) => Payload::Tree(element),
                None => Payload::Empty,
            };
        }
        Ok(())
    }

    /// `Body` start tag, the content, `Body` end tag and an end-of-document event.
    pub fn event_reader(&mut self) -> Result<CompositeEventReader<'static>, SoapError> {
        let start = XmlEvent::StartElement {
            name: self.name.clone(),
            attributes: self.attributes.clone(),
            namespaces: self.namespaces.clone(),
        };
        let mut sources: Vec<Box<dyn EventReader + Send>> =
            vec![Box::new(BufferedEventReader::fragment([start]))];
        if let Some(content) = self.payload_source()? {
            sources.push(content);
        }
        sources.push(Box::new(BufferedEventReader::fragment([XmlEvent::end(
            self.name.clone(),
        )])));
        Ok(CompositeEventReader::new(sources))
    }
}

/// What follows the body start tag of a parsed message.
pub(crate) enum BodyContent {
    Empty,
    Fault(SoapFault),
    /// Stream positioned at the payload start tag
    Payload(PayloadSource),
    /// Payload read while parsing
    Tree(Element),
}

/// A payload that fails to read came from a message that could not be created.
fn payload_error(cause: XmlStreamError) -> SoapError {
    SoapError::creation_caused_by("could not read SOAP body payload", cause)
}

/// Consume the `Body` and `Envelope` end tags and the end of the document.
///
/// The body holds a single element, so another element here is an error.
pub(crate) fn read_envelope_end<R: EventReader + ?Sized>(
    source: &mut R,
    version: SoapVersion,
) -> Result<(), XmlStreamError> {
    for expected in [version.body_name(), version.envelope_element_name()] {
        skip_ignorable(source)?;
        match source.next_event()? {
            XmlEvent::EndElement { name } if name == expected => {}
            XmlEvent::StartElement { name, .. } if expected == version.body_name() => {
                return Err(XmlStreamError::Malformed(format!(
                    "unexpected element {} after the body payload",
                    name
                )))
            }
            other => {
                return Err(XmlStreamError::Malformed(format!(
                    "expected end of {}, found {:?}",
                    expected.local_part(),
                    other
                )))
            }
        }
    }
    skip_ignorable(source)?;
    match source.next_event()? {
        XmlEvent::EndDocument => Ok(()),
        other => Err(XmlStreamError::Malformed(format!(
            "unexpected {:?} after envelope",
            other
        ))),
    }
}

/// Payload subtree of a parsed envelope.
///
/// Yields the payload element, then an end-of-document event. The rest of the
/// envelope is checked with [`read_envelope_end`] as soon as the payload end
/// tag is read, so truncated input or trailing content fails the read.
pub(crate) struct EnvelopePayload {
    inner: PayloadSource,
    version: SoapVersion,
    depth: usize,
    end: Option<XmlEvent>,
    finished: bool,
}

impl EnvelopePayload {
    /// `inner` must be positioned at the payload start tag.
    pub(crate) fn new(inner: PayloadSource, version: SoapVersion) -> Self {
        Self {
            inner,
            version,
            depth: 0,
            end: Some(XmlEvent::EndDocument),
            finished: false,
        }
    }
}

impl EventReader for EnvelopePayload {
    fn has_next(&mut self) -> bool {
        self.end.is_some()
    }

    fn next_event(&mut self) -> Result<XmlEvent, XmlStreamError> {
        if self.finished {
            return self.end.take().ok_or(XmlStreamError::UnexpectedEnd);
        }
        let event = self.inner.next_event()?;
        match &event {
            XmlEvent::StartElement { .. } => self.depth += 1,
            XmlEvent::EndElement { .. } => {
                self.depth = self.depth.saturating_sub(1);
                if self.depth == 0 {
                    read_envelope_end(&mut self.inner, self.version)?;
                    self.finished = true;
                }
            }
            XmlEvent::EndDocument => return Err(XmlStreamError::UnexpectedEnd),
            _ => {}
        }
        Ok(event)
    }

    fn peek(&mut self) -> Result<Option<&XmlEvent>, XmlStreamError> {
        if self.finished {
            return Ok(self.end.as_ref());
        }
        self.inner.peek()
    }
}

fn read_subtree(stream: PayloadSource) -> Result<Option<Element>, XmlStreamError> {
    let mut subtree = SubtreeReader::new(stream);
    match subtree.peek()? {
        Some(event) if event.is_start_element() => Element::read_from(&mut subtree).map(Some),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{collect_events, QuickXmlEventReader};
    use crate::version::{SOAP_11_NS, SOAP_12_NS};
    use crate::writer::events_to_string;

    fn streamed(xml: &'static str) -> PayloadSource {
        Box::new(QuickXmlEventReader::new(xml.as_bytes()))
    }

    fn order() -> Element {
        Element::with_text(QName::with_prefix("urn:orders", "Order", "o"), "42")
    }

    #[test]
    fn test_new_body_is_empty() {
        let mut body = SoapBody::new(SoapVersion::Soap11, false);
        assert!(!body.has_fault());
        assert!(!body.has_payload());
        assert!(body.payload_source().unwrap().is_none());
        assert!(body.payload().unwrap().is_none());
        assert_eq!(body.name(), &QName::new(SOAP_11_NS, "Body"));
    }

    #[test]
    fn test_uncached_payload_reads_once() {
        let mut body = SoapBody::new(SoapVersion::Soap11, false);
        body.set_payload_source(streamed(r#"<o:Order xmlns:o="urn:orders">42</o:Order>"#));
        assert!(body.has_payload());

        let mut source = body.payload_source().unwrap().unwrap();
        let element = Element::read_from(&mut source).unwrap();
        assert_eq!(element.text(), "42");

        assert!(!body.has_payload());
        assert!(matches!(body.payload_source(), Err(SoapError::PayloadConsumed)));
        assert!(matches!(body.payload(), Err(SoapError::PayloadConsumed)));
    }

    #[test]
    fn test_cached_payload_reads_repeat() {
        let mut body = SoapBody::new(SoapVersion::Soap11, true);
        body.set_payload_source(streamed(r#"<o:Order xmlns:o="urn:orders">42</o:Order>"#));
        let first = body.payload().unwrap().unwrap();
        let second = body.payload().unwrap().unwrap();
        assert_eq!(first, second);
        assert!(body.cached_payload().is_some());

        let events = collect_events(&mut body.payload_source().unwrap().unwrap()).unwrap();
        assert_eq!(events.len(), 4);
        assert!(events.last().unwrap().is_end_document());
    }

    #[test]
    fn test_payload_root_name_does_not_consume() {
        let mut body = SoapBody::new(SoapVersion::Soap12, false);
        body.set_payload_source(streamed("<Ping xmlns=\"urn:p\"/>"));
        assert_eq!(
            body.payload_root_name().unwrap(),
            Some(QName::new("urn:p", "Ping"))
        );
        assert!(body.payload().unwrap().is_some());
    }

    #[test]
    fn test_adding_fault_replaces_payload() {
        let mut body = SoapBody::new(SoapVersion::Soap11, true);
        body.set_payload(order());
        body.add_client_or_sender_fault("bad request", None);
        assert!(body.has_fault());
        assert!(!body.has_payload());
        assert!(body.cached_payload().is_none());
        let content = body.payload().unwrap().unwrap();
        assert_eq!(content.name, QName::new(SOAP_11_NS, "Fault"));
        assert_eq!(
            body.fault().unwrap().fault_code(),
            &QName::new(SOAP_11_NS, "Client")
        );
    }

    #[test]
    fn test_setting_payload_removes_fault() {
        let mut body = SoapBody::new(SoapVersion::Soap12, false);
        body.add_server_or_receiver_fault("oops", Some("en"));
        body.set_payload(order());
        assert!(!body.has_fault());
        assert!(body.has_payload());
    }

    #[test]
    fn test_fault_kinds_per_version() {
        let mut body = SoapBody::new(SoapVersion::Soap12, false);
        let fault = body.add_client_or_sender_fault("client", None);
        assert_eq!(fault.fault_code(), &QName::new(SOAP_12_NS, "Sender"));
        let fault = body.add_must_understand_fault("mu", None);
        assert_eq!(fault.fault_code().local_part(), "MustUnderstand");
        let fault = body.add_version_mismatch_fault("vm", None);
        assert_eq!(fault.fault_code().local_part(), "VersionMismatch");
        assert_eq!(
            fault.as_soap12().unwrap().fault_reason_text("en"),
            Some("vm")
        );
    }

    #[test]
    fn test_custom_fault_codes() {
        let mut soap11 = SoapBody::new(SoapVersion::Soap11, false);
        let code = QName::with_prefix("urn:app", "Timeout", "app");
        assert!(soap11.add_fault(code.clone(), "late", None).is_ok());
        assert!(soap11.add_fault(QName::local("Timeout"), "late", None).is_err());

        let mut soap12 = SoapBody::new(SoapVersion::Soap12, false);
        assert!(matches!(
            soap12.add_fault(code, "late", None),
            Err(SoapError::InvalidFaultDefinition(_))
        ));
        assert!(soap12
            .add_fault(QName::new(SOAP_12_NS, "DataEncodingUnknown"), "enc", None)
            .is_ok());
    }

    #[test]
    fn test_body_event_reader() {
        let mut body = SoapBody::new(SoapVersion::Soap11, false);
        body.set_payload(order());
        let events = collect_events(&mut body.event_reader().unwrap()).unwrap();
        assert_eq!(events.iter().filter(|e| e.is_end_document()).count(), 1);
        let xml = events_to_string(&events[..events.len() - 1]).unwrap();
        assert_eq!(
            xml,
            r#"<SOAP-ENV:Body xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/"><o:Order xmlns:o="urn:orders">42</o:Order></SOAP-ENV:Body>"#
        );
    }

    #[test]
    fn test_empty_stream_source() {
        let mut body = SoapBody::new(SoapVersion::Soap11, true);
        body.set_payload_source(Box::new(BufferedEventReader::fragment(Vec::new())));
        assert!(body.payload().unwrap().is_none());
        assert!(!body.has_payload());
    }
}
