//! Configuration types for the streaming SOAP server.

use crate::version::SoapVersion;
use serde::{Deserialize, Serialize};

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSoapConfig {
    /// Config version
    pub version: String,

    /// General settings
    pub settings: SettingsConfig,

    /// Message factory configuration
    pub factory: FactoryConfig,

    /// Error to fault mapping
    pub faults: FaultsConfig,
}

impl Default for StreamingSoapConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            settings: SettingsConfig::default(),
            factory: FactoryConfig::default(),
            faults: FaultsConfig::default(),
        }
    }
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Address the server listens on
    pub listen: String,

    /// Maximum request size to read (bytes)
    pub max_request_size: usize,

    /// Socket read timeout in seconds (0 disables it)
    pub read_timeout_secs: u64,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
            max_request_size: 1_048_576, // 1MB
            read_timeout_secs: 30,
        }
    }
}

/// Message factory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FactoryConfig {
    /// SOAP version of created messages
    pub soap_version: SoapVersion,

    /// Materialize payloads on first access so they can be read repeatedly
    pub payload_caching: bool,

    /// Trim whitespace around text while reading
    pub trim_text: bool,

    /// Reject documents whose end tags do not match
    pub check_end_names: bool,

    /// Write an XML declaration before the envelope
    pub write_declaration: bool,

    /// Indentation width for written XML (none for compact output)
    pub indent: Option<usize>,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            soap_version: SoapVersion::Soap11,
            payload_caching: true,
            trim_text: false,
            check_end_names: true,
            write_declaration: true,
            indent: None,
        }
    }
}

/// Error to fault mapping configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultsConfig {
    /// Ordered error type to fault definition mappings
    pub mappings: Vec<FaultMappingConfig>,

    /// Fault definition used when no mapping matches (`CODE, reason[, locale]`)
    pub default_fault: Option<String>,

    /// Parent relations between error type names
    pub hierarchy: Vec<HierarchyConfig>,

    /// Only resolve errors from endpoints matching these glob patterns (empty: all)
    pub mapped_endpoints: Vec<String>,

    /// Add a detail entry describing the error to every resolved fault
    pub include_error_detail: bool,

    /// Turn errors no mapping handles into server/receiver faults
    pub generic_fallback: bool,
}

impl Default for FaultsConfig {
    fn default() -> Self {
        Self {
            mappings: Vec::new(),
            default_fault: None,
            hierarchy: Vec::new(),
            mapped_endpoints: Vec::new(),
            include_error_detail: false,
            generic_fallback: true,
        }
    }
}

/// One error type to fault definition mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultMappingConfig {
    /// Error type name, matched against the error and its ancestors
    pub error: String,

    /// Fault definition (`CODE, reason[, locale]`)
    pub fault: String,
}

/// Parent relation of an error type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyConfig {
    /// Error type name
    pub error: String,

    /// Name of its parent type
    pub parent: String,
}
