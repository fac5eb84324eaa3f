//! Fault definitions: the outcome of mapping an error to a fault.

use crate::error::SoapError;
use crate::event::QName;
use crate::fault::DEFAULT_FAULT_LANGUAGE;
use crate::version::SoapVersion;
use std::fmt;
use std::str::FromStr;

/// Fault code of a definition.
///
/// The standard codes are version independent: `Client` and `Sender` both
/// become the client/sender code of the message version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultCode {
    Client,
    Sender,
    Server,
    Receiver,
    VersionMismatch,
    MustUnderstand,
    /// Application code in `{namespace}local` form
    Custom(QName),
}

impl FaultCode {
    /// The qualified code for a message of `version`.
    pub fn qualified_name(&self, version: SoapVersion) -> QName {
        match self {
            Self::Client | Self::Sender => version.client_or_sender_fault_name(),
            Self::Server | Self::Receiver => version.server_or_receiver_fault_name(),
            Self::VersionMismatch => version.version_mismatch_fault_name(),
            Self::MustUnderstand => version.must_understand_fault_name(),
            Self::Custom(name) => name.clone(),
        }
    }

    /// Whether this is the client (SOAP 1.1) or sender (SOAP 1.2) code.
    pub fn is_client_or_sender(&self) -> bool {
        matches!(self, Self::Client | Self::Sender)
    }

    /// Whether this is the server (SOAP 1.1) or receiver (SOAP 1.2) code.
    pub fn is_server_or_receiver(&self) -> bool {
        matches!(self, Self::Server | Self::Receiver)
    }
}

impl FromStr for FaultCode {
    type Err = SoapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        match code.to_ascii_uppercase().as_str() {
            "CLIENT" => Ok(Self::Client),
            "SENDER" => Ok(Self::Sender),
            "SERVER" => Ok(Self::Server),
            "RECEIVER" => Ok(Self::Receiver),
            "VERSIONMISMATCH" => Ok(Self::VersionMismatch),
            "MUSTUNDERSTAND" => Ok(Self::MustUnderstand),
            _ if code.starts_with('{') => code
                .parse::<QName>()
                .map(Self::Custom)
                .map_err(|_| SoapError::InvalidFaultDefinition(format!("invalid fault code '{}'", code))),
            _ => Err(SoapError::InvalidFaultDefinition(format!(
                "unknown fault code '{}'",
                code
            ))),
        }
    }
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => f.write_str("CLIENT"),
            Self::Sender => f.write_str("SENDER"),
            Self::Server => f.write_str("SERVER"),
            Self::Receiver => f.write_str("RECEIVER"),
            Self::VersionMismatch => f.write_str("VERSIONMISMATCH"),
            Self::MustUnderstand => f.write_str("MUSTUNDERSTAND"),
            Self::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// Code, reason text and locale of a fault to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapFaultDefinition {
    /// Version independent fault code
    fault_code: FaultCode,
    /// Reason text; `None` falls back to the error's message
    fault_string_or_reason: Option<String>,
    /// Language tag of the reason text
    locale: String,
}

impl SoapFaultDefinition {
    /// Definition with `fault_code`, no reason and the default locale.
    pub fn new(fault_code: FaultCode) -> Self {
        Self {
            fault_code,
            fault_string_or_reason: None,
            locale: DEFAULT_FAULT_LANGUAGE.to_string(),
        }
    }

    /// Set the reason text; an empty reason leaves it unset.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        self.fault_string_or_reason = (!reason.is_empty()).then_some(reason);
        self
    }

    /// Set the locale of the reason text.
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Code of the fault to produce.
    pub fn fault_code(&self) -> &FaultCode {
        &self.fault_code
    }

    /// Reason text, `None` when the fault should use the error's own message.
    pub fn fault_string_or_reason(&self) -> Option<&str> {
        self.fault_string_or_reason.as_deref()
    }

    /// Locale of the reason text, `en` unless configured.
    pub fn locale(&self) -> &str {
        &self.locale
    }
}

/// Parses `CODE, reason[, locale]`. Reason and locale are optional; every
/// part is trimmed and fields after the locale are ignored.
impl FromStr for SoapFaultDefinition {
    type Err = SoapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(',').map(str::trim);
        let code = parts
            .next()
            .filter(|code| !code.is_empty())
            .ok_or_else(|| SoapError::InvalidFaultDefinition("missing fault code".to_string()))?;
        let mut definition = Self::new(code.parse()?);
        if let Some(reason) = parts.next() {
            definition = definition.with_reason(reason);
        }
        if let Some(locale) = parts.next().filter(|locale| !locale.is_empty()) {
            definition = definition.with_locale(locale);
        }
        Ok(definition)
    }
}

impl fmt::Display for SoapFaultDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fault_code)?;
        if let Some(reason) = &self.fault_string_or_reason {
            write!(f, ", {}, {}", reason, self.locale)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::{SOAP_11_NS, SOAP_12_NS};

    #[test]
    fn test_parse_full_definition() {
        let definition: SoapFaultDefinition = "SENDER, Sender error, de".parse().unwrap();
        assert_eq!(definition.fault_code(), &FaultCode::Sender);
        assert_eq!(definition.fault_string_or_reason(), Some("Sender error"));
        assert_eq!(definition.locale(), "de");
    }

    #[test]
    fn test_parse_code_only() {
        let definition: SoapFaultDefinition = "SERVER".parse().unwrap();
        assert_eq!(definition.fault_code(), &FaultCode::Server);
        assert_eq!(definition.fault_string_or_reason(), None);
        assert_eq!(definition.locale(), "en");

        let definition: SoapFaultDefinition = "client, ".parse().unwrap();
        assert_eq!(definition.fault_code(), &FaultCode::Client);
        assert_eq!(definition.fault_string_or_reason(), None);
    }

    #[test]
    fn test_reason_may_not_contain_locale_separator() {
        let definition: SoapFaultDefinition = "SERVER,Server error".parse().unwrap();
        assert_eq!(definition.fault_string_or_reason(), Some("Server error"));
    }

    #[test]
    fn test_fields_after_locale_ignored() {
        let definition: SoapFaultDefinition = "SERVER, Server error, de, extra, more".parse().unwrap();
        assert_eq!(definition.fault_code(), &FaultCode::Server);
        assert_eq!(definition.fault_string_or_reason(), Some("Server error"));
        assert_eq!(definition.locale(), "de");
    }

    #[test]
    fn test_custom_code() {
        let definition: SoapFaultDefinition = "{urn:app}Timeout, Too slow".parse().unwrap();
        assert_eq!(
            definition.fault_code(),
            &FaultCode::Custom(QName::new("urn:app", "Timeout"))
        );
    }

    #[test]
    fn test_invalid_definitions() {
        assert!(matches!(
            "".parse::<SoapFaultDefinition>(),
            Err(SoapError::InvalidFaultDefinition(_))
        ));
        assert!("OOPS, reason".parse::<SoapFaultDefinition>().is_err());
    }

    #[test]
    fn test_code_is_version_independent() {
        assert_eq!(
            FaultCode::Client.qualified_name(SoapVersion::Soap12),
            QName::new(SOAP_12_NS, "Sender")
        );
        assert_eq!(
            FaultCode::Receiver.qualified_name(SoapVersion::Soap11),
            QName::new(SOAP_11_NS, "Server")
        );
    }

    #[test]
    fn test_display() {
        let definition: SoapFaultDefinition = "client,Bad request".parse().unwrap();
        assert_eq!(definition.to_string(), "CLIENT, Bad request, en");
    }
}
