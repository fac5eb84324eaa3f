//! Error types for the streaming SOAP message layer.

use thiserror::Error;

/// Failures of the XML event layer (readers, writers, element trees).
#[derive(Error, Debug)]
pub enum XmlStreamError {
    #[error("XML parsing error: {0}")]
    Parse(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("Invalid UTF-8 in XML name: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("DOCTYPE declarations are not allowed")]
    DoctypeNotAllowed,

    #[error("Unexpected end of XML event stream")]
    UnexpectedEnd,

    #[error("Malformed XML event stream: {0}")]
    Malformed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// SOAP message layer errors.
#[derive(Error, Debug)]
pub enum SoapError {
    #[error("Could not create message: {message}")]
    MessageCreation {
        message: String,
        #[source]
        source: Option<XmlStreamError>,
    },

    #[error("Unsupported SOAP version: {0}")]
    UnsupportedVersion(String),

    #[error("Payload has already been consumed; enable payload caching to read it more than once")]
    PayloadConsumed,

    #[error("Invalid SOAP envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Invalid fault definition: {0}")]
    InvalidFaultDefinition(String),

    #[error("Request exceeds the maximum size of {0} bytes")]
    RequestTooLarge(u64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("XML stream error: {0}")]
    Xml(#[from] XmlStreamError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SoapError {
    /// Message creation failure without an underlying XML cause.
    pub fn creation(message: impl Into<String>) -> Self {
        Self::MessageCreation {
            message: message.into(),
            source: None,
        }
    }

    /// Message creation failure wrapping the XML error that caused it.
    pub fn creation_caused_by(message: impl Into<String>, source: XmlStreamError) -> Self {
        Self::MessageCreation {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Whether this error was raised while building a message from input.
    pub fn is_message_creation(&self) -> bool {
        matches!(self, Self::MessageCreation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_creation_error_keeps_cause() {
        let err = SoapError::creation_caused_by("bad input", XmlStreamError::UnexpectedEnd);
        assert!(err.is_message_creation());
        assert_eq!(err.to_string(), "Could not create message: bad input");
        let source = err.source().expect("cause should be kept");
        assert_eq!(source.to_string(), "Unexpected end of XML event stream");
    }

    #[test]
    fn test_creation_error_without_cause() {
        let err = SoapError::creation("no body");
        assert!(err.source().is_none());
        assert!(!SoapError::PayloadConsumed.is_message_creation());
    }
}
