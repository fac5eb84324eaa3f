//! Mapping of endpoint errors to SOAP faults.
//!
//! [`SoapFaultMappingResolver`] holds an ordered list of error type name to
//! [`SoapFaultDefinition`] mappings. For a raised error every mapping is
//! measured against the error's type and its ancestors, and the closest
//! mapping wins; mappings at the same distance are decided by declaration
//! order. Ancestors come from a [`TypeHierarchy`], which keeps the matching
//! independent from any real type system.

use crate::body::SoapBody;
use crate::config::{FaultsConfig, HierarchyConfig};
use crate::context::MessageContext;
use crate::definition::{FaultCode, SoapFaultDefinition};
use crate::error::SoapError;
use crate::event::QName;
use crate::fault::{SoapFault, DEFAULT_FAULT_LANGUAGE};
use crate::tree::Element;
use crate::version::SoapVersion;
use glob::Pattern;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Upper bound on ancestor lookups for a single depth computation.
pub const MAX_HIERARCHY_DEPTH: usize = 64;

/// An error raised by endpoint code, described by its type name and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointError {
    type_name: String,
    message: Option<String>,
}

impl EndpointError {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: None,
        }
    }

    /// Empty messages are treated as absent.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.message = (!message.is_empty()).then_some(message);
        self
    }

    /// Describe a Rust error by its type path and `Display` output.
    pub fn of<E: std::error::Error>(error: &E) -> Self {
        Self::new(std::any::type_name::<E>()).with_message(error.to_string())
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for EndpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.type_name, message),
            None => f.write_str(&self.type_name),
        }
    }
}

impl std::error::Error for EndpointError {}

/// Parent lookup for error type names.
pub trait TypeHierarchy: Send + Sync {
    /// The direct parent of `type_name`; `None` for a root or unknown type.
    fn parent_of(&self, type_name: &str) -> Option<&str>;
}

/// [`TypeHierarchy`] backed by an explicit child to parent table.
#[derive(Debug, Clone, Default)]
pub struct ErrorHierarchy {
    parents: HashMap<String, String>,
}

impl ErrorHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(entries: &[HierarchyConfig]) -> Self {
        let mut hierarchy = Self::new();
        for entry in entries {
            hierarchy.insert(&entry.error, &entry.parent);
        }
        hierarchy
    }

    pub fn with_parent(mut self, type_name: impl Into<String>, parent: impl Into<String>) -> Self {
        self.insert(type_name, parent);
        self
    }

    pub fn insert(&mut self, type_name: impl Into<String>, parent: impl Into<String>) {
        self.parents.insert(type_name.into(), parent.into());
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

impl TypeHierarchy for ErrorHierarchy {
    fn parent_of(&self, type_name: &str) -> Option<&str> {
        self.parents.get(type_name).map(String::as_str)
    }
}

/// Something that may turn an endpoint error into a response.
pub trait EndpointErrorResolver: Send + Sync {
    /// Handle `error` raised by `endpoint`. Returns `false` to let the next
    /// resolver, or the caller, deal with it.
    fn resolve_error(
        &self,
        context: &mut MessageContext,
        endpoint: Option<&str>,
        error: &EndpointError,
    ) -> bool;
}

/// Offer `error` to each resolver in turn until one handles it.
pub fn resolve_with(
    resolvers: &[Box<dyn EndpointErrorResolver>],
    context: &mut MessageContext,
    endpoint: Option<&str>,
    error: &EndpointError,
) -> bool {
    resolvers
        .iter()
        .any(|resolver| resolver.resolve_error(context, endpoint, error))
}

/// Hook run on every fault a resolver produces.
pub trait FaultCustomizer: Send + Sync {
    fn customize_fault(&self, endpoint: Option<&str>, error: &EndpointError, fault: &mut SoapFault);
}

/// Adds an `ErrorDetail` entry carrying the error type and message.
#[derive(Debug, Clone)]
pub struct ErrorDetailCustomizer {
    namespace: String,
}

impl ErrorDetailCustomizer {
    pub const DEFAULT_NAMESPACE: &'static str = "urn:streaming-soap:error";

    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

impl Default for ErrorDetailCustomizer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_NAMESPACE)
    }
}

impl FaultCustomizer for ErrorDetailCustomizer {
    fn customize_fault(&self, _endpoint: Option<&str>, error: &EndpointError, fault: &mut SoapFault) {
        let name = |local: &str| QName::with_prefix(self.namespace.as_str(), local, "err");
        let entry = fault.add_fault_detail().add_entry(name("ErrorDetail"));
        entry.add_child(Element::with_text(name("Type"), error.type_name()));
        if let Some(message) = error.message() {
            entry.add_child(Element::with_text(name("Message"), message));
        }
    }
}

/// Resolves errors to faults through ordered type name mappings.
pub struct SoapFaultMappingResolver {
    mappings: Vec<(String, SoapFaultDefinition)>,
    default_fault: Option<SoapFaultDefinition>,
    hierarchy: Arc<dyn TypeHierarchy>,
    mapped_endpoints: Vec<Pattern>,
    customizer: Option<Box<dyn FaultCustomizer>>,
}

impl SoapFaultMappingResolver {
    pub fn new(hierarchy: Arc<dyn TypeHierarchy>) -> Self {
        Self {
            mappings: Vec::new(),
            default_fault: None,
            hierarchy,
            mapped_endpoints: Vec::new(),
            customizer: None,
        }
    }

    pub fn from_config(config: &FaultsConfig) -> Result<Self, SoapError> {
        let hierarchy = ErrorHierarchy::from_config(&config.hierarchy);
        let mut resolver = Self::new(Arc::new(hierarchy));
        for mapping in &config.mappings {
            let definition = mapping.fault.parse::<SoapFaultDefinition>().map_err(|e| {
                SoapError::Config(format!("mapping for '{}': {}", mapping.error, e))
            })?;
            resolver.add_mapping(mapping.error.clone(), definition);
        }
        if let Some(default_fault) = &config.default_fault {
            let definition = default_fault
                .parse::<SoapFaultDefinition>()
                .map_err(|e| SoapError::Config(format!("default fault: {}", e)))?;
            resolver.set_default_fault(Some(definition));
        }
        resolver.set_mapped_endpoints(&config.mapped_endpoints)?;
        if config.include_error_detail {
            resolver.set_customizer(Box::new(ErrorDetailCustomizer::default()));
        }
        Ok(resolver)
    }

    /// Append a mapping; earlier mappings win ties.
    pub fn add_mapping(&mut self, error_type: impl Into<String>, definition: SoapFaultDefinition) {
        self.mappings.push((error_type.into(), definition));
    }

    /// Builder form of [`add_mapping`](Self::add_mapping) taking the textual definition.
    pub fn with_mapping(mut self, error_type: &str, definition: &str) -> Result<Self, SoapError> {
        self.add_mapping(error_type, definition.parse::<SoapFaultDefinition>()?);
        Ok(self)
    }

    pub fn set_default_fault(&mut self, default_fault: Option<SoapFaultDefinition>) {
        self.default_fault = default_fault;
    }

    /// Restrict resolution to endpoints whose name matches one of `patterns`.
    pub fn set_mapped_endpoints(&mut self, patterns: &[String]) -> Result<(), SoapError> {
        self.mapped_endpoints = patterns
            .iter()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|e| {
                    SoapError::Config(format!("invalid endpoint pattern '{}': {}", pattern, e))
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(())
    }

    pub fn set_customizer(&mut self, customizer: Box<dyn FaultCustomizer>) {
        self.customizer = Some(customizer);
    }

    pub fn mapping_count(&self) -> usize {
        self.mappings.len()
    }

    /// Distance from the error's type to the closest ancestor whose name
    /// contains `pattern`: 0 for the type itself, 1 for its parent, and so on.
    pub fn depth(&self, pattern: &str, error: &EndpointError) -> Option<usize> {
        let mut current = Some(error.type_name());
        let mut depth = 0;
        while let Some(type_name) = current {
            if type_name.contains(pattern) {
                return Some(depth);
            }
            if depth >= MAX_HIERARCHY_DEPTH {
                warn!(
                    error_type = %error.type_name(),
                    max_depth = MAX_HIERARCHY_DEPTH,
                    "Type hierarchy too deep, giving up"
                );
                return None;
            }
            current = self.hierarchy.parent_of(type_name);
            depth += 1;
        }
        None
    }

    /// Definition of the closest mapping, or the default fault.
    pub fn fault_definition(&self, error: &EndpointError) -> Option<&SoapFaultDefinition> {
        let mut closest: Option<(usize, &SoapFaultDefinition)> = None;
        for (pattern, definition) in &self.mappings {
            if let Some(depth) = self.depth(pattern, error) {
                if closest.map_or(true, |(best, _)| depth < best) {
                    closest = Some((depth, definition));
                }
            }
        }
        closest
            .map(|(_, definition)| definition)
            .or(self.default_fault.as_ref())
    }

    fn handles_endpoint(&self, endpoint: Option<&str>) -> bool {
        if self.mapped_endpoints.is_empty() {
            return true;
        }
        match endpoint {
            Some(endpoint) => self.mapped_endpoints.iter().any(|p| p.matches(endpoint)),
            None => false,
        }
    }
}

impl EndpointErrorResolver for SoapFaultMappingResolver {
    fn resolve_error(
        &self,
        context: &mut MessageContext,
        endpoint: Option<&str>,
        error: &EndpointError,
    ) -> bool {
        if !self.handles_endpoint(endpoint) {
            debug!(endpoint = ?endpoint, "Endpoint not mapped, skipping fault resolution");
            return false;
        }
        let Some(definition) = self.fault_definition(error) else {
            debug!(error = %error, "No fault mapping for error");
            return false;
        };

        let reason = definition
            .fault_string_or_reason()
            .or(error.message())
            .unwrap_or(error.type_name())
            .to_string();

        let created = !context.has_response();
        let response = context.response_mut();
        let version = response.version();
        let fault = match install_fault(response.soap_body_mut(), version, definition, reason) {
            Ok(fault) => fault,
            Err(e) => {
                warn!(error = %error, reason = %e, "Could not add fault to response");
                // a response the endpoint built is left alone
                if created {
                    context.clear_response();
                }
                return false;
            }
        };
        if let Some(customizer) = &self.customizer {
            customizer.customize_fault(endpoint, error, fault);
        }

        info!(
            endpoint = ?endpoint,
            error = %error,
            fault_code = %definition.fault_code(),
            "Resolved error to SOAP fault"
        );
        true
    }
}

/// Add the fault `definition` describes to `body`.
///
/// SOAP 1.2 does not allow custom top-level codes, so a custom code becomes
/// the subcode of a receiver fault there.
fn install_fault<'b>(
    body: &'b mut SoapBody,
    version: SoapVersion,
    definition: &SoapFaultDefinition,
    reason: String,
) -> Result<&'b mut SoapFault, SoapError> {
    let locale = Some(definition.locale());
    match definition.fault_code() {
        code if code.is_client_or_sender() => Ok(body.add_client_or_sender_fault(reason, locale)),
        code if code.is_server_or_receiver() => {
            Ok(body.add_server_or_receiver_fault(reason, locale))
        }
        FaultCode::Custom(name) if version == SoapVersion::Soap12 => {
            let fault = body.add_server_or_receiver_fault(reason, locale);
            if let Some(soap12) = fault.as_soap12_mut() {
                soap12.add_fault_subcode(name.clone());
            }
            Ok(fault)
        }
        code => body.add_fault(code.qualified_name(version), reason, locale),
    }
}

/// Maps every error to a server/receiver fault carrying the error message.
#[derive(Debug, Clone, Default)]
pub struct SimpleSoapFaultResolver;

impl EndpointErrorResolver for SimpleSoapFaultResolver {
    fn resolve_error(
        &self,
        context: &mut MessageContext,
        endpoint: Option<&str>,
        error: &EndpointError,
    ) -> bool {
        let reason = error.message().unwrap_or(error.type_name()).to_string();
        context
            .response_mut()
            .soap_body_mut()
            .add_server_or_receiver_fault(reason, Some(DEFAULT_FAULT_LANGUAGE));
        debug!(endpoint = ?endpoint, error = %error, "Resolved error to generic fault");
        true
    }
}
