//! SOAP protocol versions and their constants.

use crate::error::SoapError;
use crate::event::QName;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// SOAP 1.1 envelope namespace.
pub const SOAP_11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
/// SOAP 1.2 envelope namespace.
pub const SOAP_12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";

/// Per-version constant bundle.
#[derive(Debug)]
pub struct VersionConstants {
    pub envelope_namespace: &'static str,
    pub prefix: &'static str,
    pub content_type: &'static str,
    pub client_or_sender_fault: &'static str,
    pub server_or_receiver_fault: &'static str,
    pub version_mismatch_fault: &'static str,
    pub must_understand_fault: &'static str,
    pub actor_or_role_attribute: &'static str,
    pub next_actor_or_role_uri: &'static str,
    pub must_understand_true: &'static str,
    pub must_understand_false: &'static str,
}

static SOAP_11: VersionConstants = VersionConstants {
    envelope_namespace: SOAP_11_NS,
    prefix: "SOAP-ENV",
    content_type: "text/xml",
    client_or_sender_fault: "Client",
    server_or_receiver_fault: "Server",
    version_mismatch_fault: "VersionMismatch",
    must_understand_fault: "MustUnderstand",
    actor_or_role_attribute: "actor",
    next_actor_or_role_uri: "http://schemas.xmlsoap.org/soap/actor/next",
    must_understand_true: "1",
    must_understand_false: "0",
};

static SOAP_12: VersionConstants = VersionConstants {
    envelope_namespace: SOAP_12_NS,
    prefix: "env",
    content_type: "application/soap+xml",
    client_or_sender_fault: "Sender",
    server_or_receiver_fault: "Receiver",
    version_mismatch_fault: "VersionMismatch",
    must_understand_fault: "MustUnderstand",
    actor_or_role_attribute: "role",
    next_actor_or_role_uri: "http://www.w3.org/2003/05/soap-envelope/role/next",
    must_understand_true: "true",
    must_understand_false: "false",
};

/// SOAP 1.2 ultimate receiver role.
pub const SOAP_12_ULTIMATE_RECEIVER_ROLE: &str =
    "http://www.w3.org/2003/05/soap-envelope/role/ultimateReceiver";

/// SOAP 1.2 role that no node plays.
pub const SOAP_12_NONE_ROLE: &str = "http://www.w3.org/2003/05/soap-envelope/role/none";

/// SOAP 1.2 fault code only defined for 1.2 envelopes.
pub const SOAP_12_DATA_ENCODING_UNKNOWN: &str = "DataEncodingUnknown";

/// SOAP versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SoapVersion {
    /// SOAP 1.1 (namespace: http://schemas.xmlsoap.org/soap/envelope/)
    #[serde(rename = "1.1")]
    Soap11,
    /// SOAP 1.2 (namespace: http://www.w3.org/2003/05/soap-envelope)
    #[serde(rename = "1.2")]
    Soap12,
}

impl SoapVersion {
    pub fn constants(&self) -> &'static VersionConstants {
        match self {
            Self::Soap11 => &SOAP_11,
            Self::Soap12 => &SOAP_12,
        }
    }

    /// Select the version whose envelope lives in `uri`.
    pub fn from_envelope_namespace(uri: &str) -> Result<Self, SoapError> {
        match uri {
            SOAP_11_NS => Ok(Self::Soap11),
            SOAP_12_NS => Ok(Self::Soap12),
            other => Err(SoapError::UnsupportedVersion(format!(
                "unknown envelope namespace '{}'",
                other
            ))),
        }
    }

    pub fn envelope_namespace(&self) -> &'static str {
        self.constants().envelope_namespace
    }

    /// Prefix used for envelope elements created from scratch.
    pub fn prefix(&self) -> &'static str {
        self.constants().prefix
    }

    /// Media type without parameters.
    pub fn content_type(&self) -> &'static str {
        self.constants().content_type
    }

    fn envelope_name(&self, local: &str) -> QName {
        QName::with_prefix(self.envelope_namespace(), local, self.prefix())
    }

    pub fn envelope_element_name(&self) -> QName {
        self.envelope_name("Envelope")
    }

    pub fn header_name(&self) -> QName {
        self.envelope_name("Header")
    }

    pub fn body_name(&self) -> QName {
        self.envelope_name("Body")
    }

    pub fn fault_name(&self) -> QName {
        self.envelope_name("Fault")
    }

    pub fn client_or_sender_fault_name(&self) -> QName {
        self.envelope_name(self.constants().client_or_sender_fault)
    }

    pub fn server_or_receiver_fault_name(&self) -> QName {
        self.envelope_name(self.constants().server_or_receiver_fault)
    }

    pub fn version_mismatch_fault_name(&self) -> QName {
        self.envelope_name(self.constants().version_mismatch_fault)
    }

    pub fn must_understand_fault_name(&self) -> QName {
        self.envelope_name(self.constants().must_understand_fault)
    }

    pub fn must_understand_attribute_name(&self) -> QName {
        self.envelope_name("mustUnderstand")
    }

    /// `actor` for SOAP 1.1, `role` for SOAP 1.2.
    pub fn actor_or_role_attribute_name(&self) -> QName {
        self.envelope_name(self.constants().actor_or_role_attribute)
    }

    pub fn next_actor_or_role_uri(&self) -> &'static str {
        self.constants().next_actor_or_role_uri
    }

    /// Lexical value written for a mustUnderstand flag.
    pub fn must_understand_value(&self, must_understand: bool) -> &'static str {
        if must_understand {
            self.constants().must_understand_true
        } else {
            self.constants().must_understand_false
        }
    }

    /// Both versions accept `1` and `true`.
    pub fn parse_must_understand(&self, value: &str) -> bool {
        matches!(value.trim(), "1" | "true")
    }

    /// Whether `code` is a fault code this version defines.
    pub fn is_standard_fault_code(&self, code: &QName) -> bool {
        if code.namespace() != self.envelope_namespace() {
            return false;
        }
        let c = self.constants();
        let local = code.local_part();
        local == c.client_or_sender_fault
            || local == c.server_or_receiver_fault
            || local == c.version_mismatch_fault
            || local == c.must_understand_fault
            || (*self == Self::Soap12 && local == SOAP_12_DATA_ENCODING_UNKNOWN)
    }
}

impl fmt::Display for SoapVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Soap11 => f.write_str("SOAP 1.1"),
            Self::Soap12 => f.write_str("SOAP 1.2"),
        }
    }
}

/// Accepts `1.1`, `1.2` and the `SOAP 1.x` display form.
impl FromStr for SoapVersion {
    type Err = SoapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim();
        let number = normalized
            .strip_prefix("SOAP")
            .map(str::trim)
            .unwrap_or(normalized);
        match number {
            "1.1" => Ok(Self::Soap11),
            "1.2" => Ok(Self::Soap12),
            _ => Err(SoapError::UnsupportedVersion(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_names() {
        let v11 = SoapVersion::Soap11;
        assert_eq!(v11.client_or_sender_fault_name(), QName::new(SOAP_11_NS, "Client"));
        assert_eq!(v11.server_or_receiver_fault_name(), QName::new(SOAP_11_NS, "Server"));
        let v12 = SoapVersion::Soap12;
        assert_eq!(v12.client_or_sender_fault_name(), QName::new(SOAP_12_NS, "Sender"));
        assert_eq!(v12.server_or_receiver_fault_name(), QName::new(SOAP_12_NS, "Receiver"));
        assert_eq!(v12.version_mismatch_fault_name().local_part(), "VersionMismatch");
    }

    #[test]
    fn test_content_types() {
        assert_eq!(SoapVersion::Soap11.content_type(), "text/xml");
        assert_eq!(SoapVersion::Soap12.content_type(), "application/soap+xml");
    }

    #[test]
    fn test_from_str() {
        assert_eq!("1.1".parse::<SoapVersion>().unwrap(), SoapVersion::Soap11);
        assert_eq!("SOAP 1.2".parse::<SoapVersion>().unwrap(), SoapVersion::Soap12);
        assert!(matches!(
            "1.0".parse::<SoapVersion>(),
            Err(SoapError::UnsupportedVersion(_))
        ));
        assert!("".parse::<SoapVersion>().is_err());
    }

    #[test]
    fn test_from_envelope_namespace() {
        assert_eq!(
            SoapVersion::from_envelope_namespace(SOAP_12_NS).unwrap(),
            SoapVersion::Soap12
        );
        assert!(SoapVersion::from_envelope_namespace("urn:not-soap").is_err());
    }

    #[test]
    fn test_must_understand_values() {
        assert_eq!(SoapVersion::Soap11.must_understand_value(true), "1");
        assert_eq!(SoapVersion::Soap12.must_understand_value(true), "true");
        assert!(SoapVersion::Soap11.parse_must_understand("true"));
        assert!(!SoapVersion::Soap12.parse_must_understand("0"));
    }

    #[test]
    fn test_standard_fault_codes() {
        let v12 = SoapVersion::Soap12;
        assert!(v12.is_standard_fault_code(&QName::new(SOAP_12_NS, "DataEncodingUnknown")));
        assert!(!SoapVersion::Soap11.is_standard_fault_code(&QName::new(SOAP_11_NS, "DataEncodingUnknown")));
        assert!(!v12.is_standard_fault_code(&QName::new("urn:custom", "Sender")));
    }

    #[test]
    fn test_serde_names() {
        let yaml = serde_yaml::to_string(&SoapVersion::Soap12).unwrap();
        assert!(yaml.contains("1.2"));
        assert_eq!(serde_yaml::from_str::<SoapVersion>(&yaml).unwrap(), SoapVersion::Soap12);
        let parsed: SoapVersion = serde_yaml::from_str("\"1.1\"").unwrap();
        assert_eq!(parsed, SoapVersion::Soap11);
    }
}
