//! SOAP envelope and message.

use crate::body::{read_envelope_end, BodyContent, EnvelopePayload, PayloadSource, SoapBody};
use crate::composite::CompositeEventReader;
use crate::error::SoapError;
use crate::event::{Attribute, Namespace, NamespaceScope, QName, XmlEvent};
use crate::fault::SoapFault;
use crate::header::SoapHeader;
use crate::reader::{skip_ignorable, skip_to_content, BufferedEventReader, EventReader};
use crate::tree::{Element, Node};
use crate::version::SoapVersion;
use crate::writer::{EventWriter, WriterSettings};
use std::io::Write;
use tracing::debug;

/// The `Envelope` of a message.
#[derive(Debug)]
pub struct SoapEnvelope {
    version: SoapVersion,
    name: QName,
    attributes: Vec<Attribute>,
    namespaces: Vec<Namespace>,
    /// Created on first use when absent
    header: Option<SoapHeader>,
    body: SoapBody,
}

impl SoapEnvelope {
    fn new(version: SoapVersion, payload_caching: bool) -> Self {
        Self {
            version,
            name: version.envelope_element_name(),
            attributes: Vec::new(),
            namespaces: Vec::new(),
            header: None,
            body: SoapBody::new(version, payload_caching),
        }
    }

    pub fn version(&self) -> SoapVersion {
        self.version
    }

    pub fn name(&self) -> &QName {
        &self.name
    }

    pub fn has_header(&self) -> bool {
        self.header.is_some()
    }

    pub fn header(&self) -> Option<&SoapHeader> {
        self.header.as_ref()
    }

    /// The header, created empty if the envelope has none.
    pub fn soap_header(&mut self) -> &mut SoapHeader {
        let version = self.version;
        self.header.get_or_insert_with(|| SoapHeader::new(version))
    }

    pub fn remove_header(&mut self) -> Option<SoapHeader> {
        self.header.take()
    }

    pub fn body(&self) -> &SoapBody {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut SoapBody {
        &mut self.body
    }

    /// The whole envelope as one document stream.
    ///
    /// Envelope start, header and body come from separate readers stitched
    /// together, so the payload is streamed rather than buffered.
    pub fn event_reader(&mut self) -> Result<CompositeEventReader<'static>, SoapError> {
        let start = XmlEvent::StartElement {
            name: self.name.clone(),
            attributes: self.attributes.clone(),
            namespaces: self.namespaces.clone(),
        };
        let mut sources: Vec<Box<dyn EventReader + Send>> =
            vec![Box::new(BufferedEventReader::document([start]))];
        if let Some(header) = &self.header {
            sources.push(Box::new(BufferedEventReader::fragment(header.to_events())));
        }
        sources.push(Box::new(self.body.event_reader()?));
        sources.push(Box::new(BufferedEventReader::fragment([XmlEvent::end(
            self.name.clone(),
        )])));
        Ok(CompositeEventReader::new(sources))
    }
}

/// A SOAP message: one envelope plus transport-level metadata.
#[derive(Debug)]
pub struct SoapMessage {
    envelope: SoapEnvelope,
    payload_caching: bool,
    soap_action: Option<String>,
    writer_settings: WriterSettings,
}

impl SoapMessage {
    /// Empty message: an envelope with an empty body and no header.
    pub fn new(version: SoapVersion, payload_caching: bool) -> Self {
        Self {
            envelope: SoapEnvelope::new(version, payload_caching),
            payload_caching,
            soap_action: None,
            writer_settings: WriterSettings::default(),
        }
    }

    /// Use `settings` for [`write_to`](Self::write_to).
    pub fn with_writer_settings(mut self, settings: WriterSettings) -> Self {
        self.writer_settings = settings;
        self
    }

    pub fn writer_settings(&self) -> WriterSettings {
        self.writer_settings
    }

    /// Read a message of `version` from an event stream.
    ///
    /// The header is read eagerly, as is a body fault. With payload caching
    /// the payload is read too, so malformed input yields no message. Without
    /// caching the payload is left in `source`; the rest of the envelope is
    /// verified once the payload has been read, and a failure there surfaces
    /// from that read. Every failure is reported as
    /// [`SoapError::MessageCreation`].
    pub fn build(
        source: PayloadSource,
        version: SoapVersion,
        payload_caching: bool,
    ) -> Result<Self, SoapError> {
        let envelope = parse_envelope(source, version, payload_caching).map_err(|e| match e {
            SoapError::MessageCreation { .. } => e,
            SoapError::Xml(cause) => {
                SoapError::creation_caused_by("could not parse SOAP message", cause)
            }
            other => SoapError::creation(other.to_string()),
        })?;
        debug!(
            version = %version,
            has_header = envelope.has_header(),
            has_fault = envelope.body.has_fault(),
            "Built SOAP message"
        );
        Ok(Self {
            envelope,
            payload_caching,
            soap_action: None,
            writer_settings: WriterSettings::default(),
        })
    }

    pub fn version(&self) -> SoapVersion {
        self.envelope.version
    }

    pub fn is_payload_caching(&self) -> bool {
        self.payload_caching
    }

    pub fn envelope(&self) -> &SoapEnvelope {
        &self.envelope
    }

    pub fn envelope_mut(&mut self) -> &mut SoapEnvelope {
        &mut self.envelope
    }

    pub fn header(&self) -> Option<&SoapHeader> {
        self.envelope.header()
    }

    /// The header, created empty if the message has none.
    pub fn soap_header(&mut self) -> &mut SoapHeader {
        self.envelope.soap_header()
    }

    pub fn soap_body(&self) -> &SoapBody {
        &self.envelope.body
    }

    pub fn soap_body_mut(&mut self) -> &mut SoapBody {
        &mut self.envelope.body
    }

    pub fn has_fault(&self) -> bool {
        self.envelope.body.has_fault()
    }

    pub fn fault(&self) -> Option<&SoapFault> {
        self.envelope.body.fault()
    }

    /// Fault string or first reason text of the body fault.
    pub fn fault_reason(&self) -> Option<&str> {
        self.fault().map(SoapFault::fault_string_or_reason)
    }

    pub fn payload_source(&mut self) -> Result<Option<PayloadSource>, SoapError> {
        self.envelope.body.payload_source()
    }

    pub fn payload(&mut self) -> Result<Option<Element>, SoapError> {
        self.envelope.body.payload()
    }

    pub fn set_payload(&mut self, payload: Element) {
        self.envelope.body.set_payload(payload);
    }

    pub fn soap_action(&self) -> Option<&str> {
        self.soap_action.as_deref()
    }

    pub fn set_soap_action(&mut self, action: impl Into<String>) {
        self.soap_action = Some(action.into());
    }

    /// Content type for the transport. SOAP 1.2 carries the action as a parameter.
    pub fn content_type(&self) -> String {
        let base = self.version().content_type();
        match (self.version(), &self.soap_action) {
            (SoapVersion::Soap12, Some(action)) => {
                format!("{}; charset=utf-8; action=\"{}\"", base, action)
            }
            _ => format!("{}; charset=utf-8", base),
        }
    }

    pub fn event_reader(&mut self) -> Result<CompositeEventReader<'static>, SoapError> {
        self.envelope.event_reader()
    }

    /// Serialize the message with its writer settings; a factory hands its
    /// own settings to every message it creates.
    pub fn write_to<W: Write>(&mut self, out: W) -> Result<W, SoapError> {
        self.write_with_settings(out, self.writer_settings)
    }

    pub fn write_with_settings<W: Write>(
        &mut self,
        out: W,
        settings: WriterSettings,
    ) -> Result<W, SoapError> {
        let mut reader = self.event_reader()?;
        let mut writer = EventWriter::with_settings(out, settings);
        writer.add_all(&mut reader)?;
        writer.flush()?;
        Ok(writer.into_inner())
    }

    /// Serialized message as a string, without an XML declaration.
    pub fn to_xml_string(&mut self) -> Result<String, SoapError> {
        let settings = WriterSettings {
            write_declaration: false,
            indent: None,
        };
        let bytes = self.write_with_settings(Vec::new(), settings)?;
        String::from_utf8(bytes).map_err(|e| SoapError::creation(e.to_string()))
    }
}

type StartTag = (QName, Vec<Attribute>, Vec<Namespace>);

/// First significant event after the body start tag.
enum BodyStart {
    Empty,
    Fault,
    Payload,
    Unexpected(String),
}

fn start_tag(event: XmlEvent, expected: &str) -> Result<StartTag, SoapError> {
    match event {
        XmlEvent::StartElement {
            name,
            attributes,
            namespaces,
        } => Ok((name, attributes, namespaces)),
        other => Err(SoapError::InvalidEnvelope(format!(
            "expected {}, found {:?}",
            expected, other
        ))),
    }
}

fn parse_envelope(
    mut source: PayloadSource,
    version: SoapVersion,
    payload_caching: bool,
) -> Result<SoapEnvelope, SoapError> {
    skip_to_content(&mut source)?;
    let (name, attributes, namespaces) = start_tag(source.next_event()?, "Envelope")?;
    if name.local_part() != "Envelope" {
        return Err(SoapError::InvalidEnvelope(format!(
            "root element {} is not a SOAP envelope",
            name
        )));
    }
    if name.namespace() != version.envelope_namespace() {
        let found = SoapVersion::from_envelope_namespace(name.namespace())
            .map(|v| v.to_string())
            .unwrap_or_else(|_| format!("namespace '{}'", name.namespace()));
        return Err(SoapError::InvalidEnvelope(format!(
            "expected a {} envelope, found {}",
            version, found
        )));
    }

    let mut scope = NamespaceScope::new();
    scope.push(&namespaces);

    skip_ignorable(&mut source)?;
    let mut next = source.next_event()?;
    let mut header = None;
    if next.element_name() == Some(&version.header_name()) && next.is_start_element() {
        let element = Element::build(next, &mut source)?;
        let elements = element
            .children
            .into_iter()
            .filter_map(|node| match node {
                Node::Element(e) => Some(e),
                _ => None,
            })
            .collect();
        header = Some(SoapHeader::parsed(
            version,
            element.name,
            element.attributes,
            element.namespaces,
            elements,
        ));
        skip_ignorable(&mut source)?;
        next = source.next_event()?;
    }

    match &next {
        XmlEvent::StartElement { name, .. } if name == &version.body_name() => {}
        XmlEvent::StartElement { name, .. } => {
            return Err(SoapError::InvalidEnvelope(format!(
                "unexpected element {} in envelope",
                name
            )))
        }
        XmlEvent::EndElement { .. } => {
            return Err(SoapError::InvalidEnvelope("envelope has no body".to_string()))
        }
        other => {
            return Err(SoapError::InvalidEnvelope(format!(
                "unexpected {:?} in envelope",
                other
            )))
        }
    }
    let body_start = start_tag(next, "Body")?;
    scope.push(&body_start.2);

    skip_ignorable(&mut source)?;
    let first = match source.peek()? {
        Some(XmlEvent::EndElement { .. }) => BodyStart::Empty,
        Some(XmlEvent::StartElement { name, .. }) if name == &version.fault_name() => {
            BodyStart::Fault
        }
        Some(XmlEvent::StartElement { .. }) => BodyStart::Payload,
        Some(other) => BodyStart::Unexpected(format!("{:?}", other)),
        None => BodyStart::Unexpected("end of input".to_string()),
    };
    let content = match first {
        BodyStart::Empty => {
            read_envelope_end(&mut source, version)?;
            BodyContent::Empty
        }
        BodyStart::Fault => {
            let element = Element::read_from(&mut source)?;
            let fault = SoapFault::from_element(version, &element, &mut scope)?;
            read_envelope_end(&mut source, version)?;
            BodyContent::Fault(fault)
        }
        // a cached payload would be read on first access anyway
        BodyStart::Payload if payload_caching => {
            let element = Element::read_from(&mut source)?;
            read_envelope_end(&mut source, version)?;
            BodyContent::Tree(element)
        }
        BodyStart::Payload => BodyContent::Payload(Box::new(EnvelopePayload::new(source, version))),
        BodyStart::Unexpected(found) => {
            return Err(SoapError::InvalidEnvelope(format!(
                "unexpected {} in body",
                found
            )))
        }
    };

    Ok(SoapEnvelope {
        version,
        name,
        attributes,
        namespaces,
        header,
        body: SoapBody::parsed(version, payload_caching, body_start, content),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::QuickXmlEventReader;
    use crate::version::{SOAP_11_NS, SOAP_12_NS};

    fn parse(xml: &'static str, version: SoapVersion, caching: bool) -> Result<SoapMessage, SoapError> {
        SoapMessage::build(Box::new(QuickXmlEventReader::new(xml.as_bytes())), version, caching)
    }

    const REQUEST_11: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/">
  <SOAP-ENV:Header>
    <t:Transaction xmlns:t="urn:trans" SOAP-ENV:mustUnderstand="1">5</t:Transaction>
  </SOAP-ENV:Header>
  <SOAP-ENV:Body>
    <m:GetPrice xmlns:m="urn:prices"><m:Item>Apples</m:Item></m:GetPrice>
  </SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#;

    #[test]
    fn test_empty_message() {
        let mut message = SoapMessage::new(SoapVersion::Soap11, false);
        assert!(message.header().is_none());
        assert!(!message.has_fault());
        assert_eq!(
            message.to_xml_string().unwrap(),
            r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/"><SOAP-ENV:Body></SOAP-ENV:Body></SOAP-ENV:Envelope>"#
        );
    }

    #[test]
    fn test_parse_header_and_payload() {
        let mut message = parse(REQUEST_11, SoapVersion::Soap11, false).unwrap();
        let header = message.header().unwrap();
        assert_eq!(header.len(), 1);
        let trans = header.header_elements().next().unwrap();
        assert!(header.is_must_understand(trans));
        assert_eq!(trans.text(), "5");

        let payload = message.payload().unwrap().unwrap();
        assert_eq!(payload.name, QName::new("urn:prices", "GetPrice"));
        assert_eq!(
            payload.child(&QName::new("urn:prices", "Item")).unwrap().text(),
            "Apples"
        );
        assert!(matches!(message.payload(), Err(SoapError::PayloadConsumed)));
    }

    #[test]
    fn test_serialize_parsed_message() {
        let mut message = parse(REQUEST_11, SoapVersion::Soap11, true).unwrap();
        let xml = message.to_xml_string().unwrap();
        assert!(xml.contains(r#"<m:GetPrice xmlns:m="urn:prices"><m:Item>Apples</m:Item></m:GetPrice>"#));
        assert!(xml.contains(r#"SOAP-ENV:mustUnderstand="1""#));
        // cached payload survives serialization
        assert!(message.payload().unwrap().is_some());
    }

    #[test]
    fn test_parse_fault_eagerly() {
        let xml = r#"<env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope"><env:Body>
<env:Fault>
  <env:Code><env:Value>env:Sender</env:Value></env:Code>
  <env:Reason><env:Text xml:lang="en">bad input</env:Text></env:Reason>
</env:Fault>
</env:Body></env:Envelope>"#;
        let message = parse(xml, SoapVersion::Soap12, false).unwrap();
        assert!(message.has_fault());
        assert_eq!(
            message.fault().unwrap().fault_code(),
            &QName::new(SOAP_12_NS, "Sender")
        );
        assert_eq!(message.fault_reason(), Some("bad input"));
    }

    #[test]
    fn test_missing_body() {
        let xml = r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/"><SOAP-ENV:Header/></SOAP-ENV:Envelope>"#;
        let err = parse(xml, SoapVersion::Soap11, false).unwrap_err();
        assert!(err.is_message_creation());
        assert!(err.to_string().contains("no body"));
    }

    #[test]
    fn test_unknown_element_in_envelope() {
        let xml = r#"<S:Envelope xmlns:S="http://schemas.xmlsoap.org/soap/envelope/"><S:Trailer/><S:Body/></S:Envelope>"#;
        assert!(parse(xml, SoapVersion::Soap11, false)
            .unwrap_err()
            .is_message_creation());
    }

    #[test]
    fn test_wrong_root_and_version() {
        assert!(parse("<Order/>", SoapVersion::Soap11, false)
            .unwrap_err()
            .is_message_creation());
        let soap12 = r#"<env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope"><env:Body/></env:Envelope>"#;
        let err = parse(soap12, SoapVersion::Soap11, false).unwrap_err();
        assert!(err.to_string().contains("SOAP 1.2"));
    }

    #[test]
    fn test_malformed_xml_keeps_cause() {
        let xml = r#"<S:Envelope xmlns:S="http://schemas.xmlsoap.org/soap/envelope/"><S:Body></S:Envelope>"#;
        match parse(xml, SoapVersion::Soap11, false) {
            Err(SoapError::MessageCreation { source, .. }) => assert!(source.is_some()),
            other => panic!("expected message creation error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_lazy_header_creation() {
        let mut message = SoapMessage::new(SoapVersion::Soap12, false);
        message
            .soap_header()
            .add_header_element(QName::with_prefix("urn:a", "Action", "a"))
            .set_text("urn:ping");
        assert!(message.envelope().has_header());
        let xml = message.to_xml_string().unwrap();
        assert!(xml.contains("<env:Header><a:Action xmlns:a=\"urn:a\">urn:ping</a:Action></env:Header>"));
    }

    #[test]
    fn test_content_type() {
        let mut soap12 = SoapMessage::new(SoapVersion::Soap12, false);
        soap12.set_soap_action("urn:ping");
        assert_eq!(
            soap12.content_type(),
            "application/soap+xml; charset=utf-8; action=\"urn:ping\""
        );
        let mut soap11 = SoapMessage::new(SoapVersion::Soap11, false);
        soap11.set_soap_action("urn:ping");
        assert_eq!(soap11.content_type(), "text/xml; charset=utf-8");
        assert_eq!(soap11.soap_action(), Some("urn:ping"));
    }

    #[test]
    fn test_write_to_includes_declaration() {
        let mut message = SoapMessage::new(SoapVersion::Soap11, false);
        message.soap_body_mut().add_server_or_receiver_fault("boom", None);
        let bytes = message.write_to(Vec::new()).unwrap();
        let xml = String::from_utf8(bytes).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("SOAP-ENV:Server"));
        assert!(xml.contains(SOAP_11_NS));
    }

    const TRUNCATED: &str = r#"<S:Envelope xmlns:S="http://schemas.xmlsoap.org/soap/envelope/"><S:Body><a:First xmlns:a="urn:a"/>"#;

    const TRAILING: &str = r#"<S:Envelope xmlns:S="http://schemas.xmlsoap.org/soap/envelope/"><S:Body><p:Op xmlns:p="urn:p"/></S:Body></S:Envelope><Trailer/>"#;

    const TWO_CHILDREN: &str = r#"<S:Envelope xmlns:S="http://schemas.xmlsoap.org/soap/envelope/"><S:Body><a:First xmlns:a="urn:a"/><b:Second xmlns:b="urn:b"/></S:Body></S:Envelope>"#;

    #[test]
    fn test_cached_parse_rejects_malformed_envelope_end() {
        for xml in [TRUNCATED, TRAILING, TWO_CHILDREN] {
            let err = parse(xml, SoapVersion::Soap11, true).unwrap_err();
            assert!(err.is_message_creation(), "{} parsed: {}", xml, err);
        }
    }

    #[test]
    fn test_uncached_payload_read_rejects_malformed_envelope_end() {
        for xml in [TRUNCATED, TRAILING, TWO_CHILDREN] {
            let mut message = parse(xml, SoapVersion::Soap11, false).unwrap();
            let err = message.payload().unwrap_err();
            assert!(err.is_message_creation(), "{} read: {}", xml, err);
        }
    }

    #[test]
    fn test_second_body_element_not_written() {
        let mut message = parse(TWO_CHILDREN, SoapVersion::Soap11, false).unwrap();
        assert!(message.to_xml_string().is_err());

        let err = parse(TWO_CHILDREN, SoapVersion::Soap11, true).unwrap_err();
        assert!(format!("{:?}", err).contains("Second"));
    }

    #[test]
    fn test_uncached_payload_stream_checks_envelope_end() {
        let mut message = parse(TRAILING, SoapVersion::Soap11, false).unwrap();
        let mut source = message.payload_source().unwrap().unwrap();
        let mut failed = false;
        while source.has_next() {
            if source.next_event().is_err() {
                failed = true;
                break;
            }
        }
        assert!(failed);
    }

    #[test]
    fn test_uncached_well_formed_envelope_reads() {
        let mut message = parse(REQUEST_11, SoapVersion::Soap11, false).unwrap();
        let xml = message.to_xml_string().unwrap();
        assert!(xml.ends_with("</SOAP-ENV:Body></SOAP-ENV:Envelope>"));
    }
}
