//! Message factory and the XML resources it shares between messages.

use crate::config::FactoryConfig;
use crate::error::SoapError;
use crate::message::SoapMessage;
use crate::reader::{QuickXmlEventReader, ReaderSettings};
use crate::version::SoapVersion;
use crate::writer::{EventWriter, WriterSettings};
use once_cell::sync::Lazy;
use std::fmt;
use std::io::{BufRead, BufReader, Read, Write};
use std::sync::Arc;
use tracing::debug;

static DEFAULT_RESOURCES: Lazy<Arc<XmlResources>> =
    Lazy::new(|| Arc::new(XmlResources::default()));

/// Reader and writer configuration shared by every message of a factory.
///
/// Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlResources {
    reader: ReaderSettings,
    writer: WriterSettings,
}

impl XmlResources {
    pub fn new(reader: ReaderSettings, writer: WriterSettings) -> Self {
        Self { reader, writer }
    }

    /// Process-wide default resources.
    pub fn shared() -> Arc<Self> {
        Arc::clone(&DEFAULT_RESOURCES)
    }

    pub fn reader_settings(&self) -> ReaderSettings {
        self.reader
    }

    pub fn writer_settings(&self) -> WriterSettings {
        self.writer
    }

    pub fn event_reader<R: BufRead>(&self, input: R) -> QuickXmlEventReader<R> {
        QuickXmlEventReader::with_settings(input, self.reader)
    }

    pub fn event_writer<W: Write>(&self, out: W) -> EventWriter<W> {
        EventWriter::with_settings(out, self.writer)
    }
}

/// Creates SOAP messages, empty or read from input.
#[derive(Debug, Clone)]
pub struct SoapMessageFactory {
    version: SoapVersion,
    payload_caching: bool,
    resources: Arc<XmlResources>,
}

impl Default for SoapMessageFactory {
    fn default() -> Self {
        Self::new(SoapVersion::Soap11)
    }
}

impl SoapMessageFactory {
    /// Factory with payload caching enabled and the shared default resources.
    pub fn new(version: SoapVersion) -> Self {
        Self {
            version,
            payload_caching: true,
            resources: XmlResources::shared(),
        }
    }

    pub fn from_config(config: &FactoryConfig) -> Self {
        let resources = XmlResources::new(
            ReaderSettings {
                trim_text: config.trim_text,
                check_end_names: config.check_end_names,
            },
            WriterSettings {
                write_declaration: config.write_declaration,
                indent: config.indent,
            },
        );
        Self {
            version: config.soap_version,
            payload_caching: config.payload_caching,
            resources: Arc::new(resources),
        }
    }

    pub fn with_resources(mut self, resources: Arc<XmlResources>) -> Self {
        self.resources = resources;
        self
    }

    pub fn soap_version(&self) -> SoapVersion {
        self.version
    }

    /// Applies to messages created afterwards.
    pub fn set_soap_version(&mut self, version: SoapVersion) {
        self.version = version;
    }

    /// Select the version by name (`1.1`, `1.2`); anything else is rejected.
    pub fn set_soap_version_name(&mut self, name: &str) -> Result<(), SoapError> {
        self.version = name.parse()?;
        Ok(())
    }

    pub fn is_payload_caching(&self) -> bool {
        self.payload_caching
    }

    /// Applies to messages created afterwards.
    pub fn set_payload_caching(&mut self, payload_caching: bool) {
        self.payload_caching = payload_caching;
    }

    pub fn resources(&self) -> &Arc<XmlResources> {
        &self.resources
    }

    /// Empty message of the configured version.
    pub fn create_message(&self) -> SoapMessage {
        SoapMessage::new(self.version, self.payload_caching)
            .with_writer_settings(self.resources.writer_settings())
    }

    /// Read a message from `input`.
    ///
    /// The payload is read lazily, so `input` is owned by the returned message.
    pub fn create_message_from<R>(&self, input: R) -> Result<SoapMessage, SoapError>
    where
        R: Read + Send + 'static,
    {
        let reader = self.resources.event_reader(BufReader::new(input));
        let message = SoapMessage::build(Box::new(reader), self.version, self.payload_caching)?
            .with_writer_settings(self.resources.writer_settings());
        debug!(factory = %self, "Created message from input");
        Ok(message)
    }

    /// Serialize `message` with this factory's writer settings.
    pub fn write_message<W: Write>(
        &self,
        message: &mut SoapMessage,
        out: W,
    ) -> Result<W, SoapError> {
        message.write_with_settings(out, self.resources.writer_settings())
    }
}

impl fmt::Display for SoapMessageFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SoapMessageFactory[{},PayloadCaching {}]",
            self.version,
            if self.payload_caching {
                "enabled"
            } else {
                "disabled"
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_display() {
        let mut factory = SoapMessageFactory::default();
        assert_eq!(
            factory.to_string(),
            "SoapMessageFactory[SOAP 1.1,PayloadCaching enabled]"
        );
        factory.set_soap_version(SoapVersion::Soap12);
        factory.set_payload_caching(false);
        assert_eq!(
            factory.to_string(),
            "SoapMessageFactory[SOAP 1.2,PayloadCaching disabled]"
        );
    }

    #[test]
    fn test_shared_resources() {
        let a = SoapMessageFactory::new(SoapVersion::Soap11);
        let b = SoapMessageFactory::new(SoapVersion::Soap12);
        assert!(Arc::ptr_eq(a.resources(), b.resources()));
    }

    #[test]
    fn test_version_by_name() {
        let mut factory = SoapMessageFactory::default();
        factory.set_soap_version_name("1.2").unwrap();
        assert_eq!(factory.soap_version(), SoapVersion::Soap12);
        assert!(matches!(
            factory.set_soap_version_name("1.0"),
            Err(SoapError::UnsupportedVersion(_))
        ));
        assert_eq!(factory.soap_version(), SoapVersion::Soap12);
    }

    #[test]
    fn test_caching_flag_not_retroactive() {
        let mut factory = SoapMessageFactory::default();
        let before = factory.create_message();
        factory.set_payload_caching(false);
        let after = factory.create_message();
        assert!(before.is_payload_caching());
        assert!(!after.is_payload_caching());
    }

    #[test]
    fn test_empty_message_round_trip() {
        let factory = SoapMessageFactory::default();
        let mut message = factory.create_message();
        let bytes = factory.write_message(&mut message, Vec::new()).unwrap();

        let mut parsed = factory.create_message_from(Cursor::new(bytes)).unwrap();
        assert!(parsed.header().is_none());
        assert!(!parsed.has_fault());
        assert!(parsed.payload().unwrap().is_none());
    }

    #[test]
    fn test_malformed_input_wrapped() {
        let factory = SoapMessageFactory::default();
        let err = factory
            .create_message_from(Cursor::new(b"<unclosed".to_vec()))
            .unwrap_err();
        assert!(err.is_message_creation());
    }

    #[test]
    fn test_doctype_rejected() {
        let factory = SoapMessageFactory::default();
        let xml = br#"<!DOCTYPE foo [<!ENTITY xxe SYSTEM "file:///etc/passwd">]><foo>&xxe;</foo>"#;
        let err = factory.create_message_from(Cursor::new(xml.to_vec())).unwrap_err();
        assert!(err.is_message_creation());
    }

    #[test]
    fn test_from_config() {
        let config = FactoryConfig {
            soap_version: SoapVersion::Soap12,
            payload_caching: false,
            write_declaration: false,
            ..FactoryConfig::default()
        };
        let factory = SoapMessageFactory::from_config(&config);
        let mut message = factory.create_message();
        assert_eq!(message.version(), SoapVersion::Soap12);
        let bytes = factory.write_message(&mut message, Vec::new()).unwrap();
        assert!(String::from_utf8(bytes).unwrap().starts_with("<env:Envelope"));
    }

    #[test]
    fn test_messages_write_with_factory_settings() {
        let config = FactoryConfig {
            write_declaration: false,
            ..FactoryConfig::default()
        };
        let factory = SoapMessageFactory::from_config(&config);

        let mut created = factory.create_message();
        let bytes = created.write_to(Vec::new()).unwrap();
        assert!(String::from_utf8(bytes.clone()).unwrap().starts_with("<SOAP-ENV:Envelope"));

        let mut parsed = factory.create_message_from(Cursor::new(bytes)).unwrap();
        assert!(!parsed.writer_settings().write_declaration);
        let bytes = parsed.write_to(Vec::new()).unwrap();
        assert!(!String::from_utf8(bytes).unwrap().starts_with("<?xml"));

        // messages built without a factory keep the defaults
        assert!(SoapMessage::new(SoapVersion::Soap11, true).writer_settings().write_declaration);
    }
}
