//! Request/response context of one message exchange.

use crate::factory::SoapMessageFactory;
use crate::message::SoapMessage;
use std::collections::HashMap;
use std::sync::Arc;

/// Holds the request and, once created, the response of an exchange.
#[derive(Debug)]
pub struct MessageContext {
    /// Incoming message
    request: SoapMessage,
    /// Outgoing message, absent until created or set
    response: Option<SoapMessage>,
    /// Factory settings applied to a created response
    factory: Arc<SoapMessageFactory>,
    /// Free-form values shared between endpoint and resolvers
    properties: HashMap<String, String>,
}

impl MessageContext {
    /// Context for `request` without a response.
    pub fn new(request: SoapMessage, factory: Arc<SoapMessageFactory>) -> Self {
        Self {
            request,
            response: None,
            factory,
            properties: HashMap::new(),
        }
    }

    /// The incoming message.
    pub fn request(&self) -> &SoapMessage {
        &self.request
    }

    /// The incoming message, for reading its payload.
    pub fn request_mut(&mut self) -> &mut SoapMessage {
        &mut self.request
    }

    /// Factory responses are created with.
    pub fn factory(&self) -> &Arc<SoapMessageFactory> {
        &self.factory
    }

    /// Whether a response has been created or set.
    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    /// The response, if any, without creating one.
    pub fn response(&self) -> Option<&SoapMessage> {
        self.response.as_ref()
    }

    /// The response, created by the factory on first access.
    ///
    /// A new response has the request's SOAP version, whatever the factory's
    /// default is, and the factory's caching and writer settings.
    pub fn response_mut(&mut self) -> &mut SoapMessage {
        let version = self.request.version();
        let factory = &self.factory;
        self.response.get_or_insert_with(|| {
            SoapMessage::new(version, factory.is_payload_caching())
                .with_writer_settings(factory.resources().writer_settings())
        })
    }

    /// Replace the response.
    pub fn set_response(&mut self, response: SoapMessage) {
        self.response = Some(response);
    }

    /// Remove and return the response.
    pub fn take_response(&mut self) -> Option<SoapMessage> {
        self.response.take()
    }

    /// Drop the response.
    pub fn clear_response(&mut self) {
        self.response = None;
    }

    /// Value of property `name`.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// Set property `name`, replacing an earlier value.
    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(name.into(), value.into());
    }

    /// Remove property `name`, returning its value.
    pub fn remove_property(&mut self, name: &str) -> Option<String> {
        self.properties.remove(name)
    }

    /// Request and response, consuming the context.
    pub fn into_parts(self) -> (SoapMessage, Option<SoapMessage>) {
        (self.request, self.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::SoapVersion;

    fn context(version: SoapVersion) -> MessageContext {
        let factory = Arc::new(SoapMessageFactory::new(SoapVersion::Soap11));
        MessageContext::new(SoapMessage::new(version, true), factory)
    }

    #[test]
    fn test_response_created_on_demand() {
        let mut ctx = context(SoapVersion::Soap11);
        assert!(!ctx.has_response());
        ctx.response_mut().set_soap_action("urn:reply");
        assert!(ctx.has_response());
        assert_eq!(ctx.response().unwrap().soap_action(), Some("urn:reply"));
        // second access returns the same response
        assert_eq!(ctx.response_mut().soap_action(), Some("urn:reply"));
    }

    #[test]
    fn test_response_follows_request_version() {
        let mut ctx = context(SoapVersion::Soap12);
        assert_eq!(ctx.response_mut().version(), SoapVersion::Soap12);
    }

    #[test]
    fn test_clear_and_take_response() {
        let mut ctx = context(SoapVersion::Soap11);
        ctx.response_mut();
        ctx.clear_response();
        assert!(!ctx.has_response());
        ctx.response_mut();
        assert!(ctx.take_response().is_some());
        assert!(ctx.take_response().is_none());
    }

    #[test]
    fn test_properties() {
        let mut ctx = context(SoapVersion::Soap11);
        ctx.set_property("endpoint", "orders/get");
        assert_eq!(ctx.property("endpoint"), Some("orders/get"));
        assert_eq!(ctx.remove_property("endpoint"), Some("orders/get".to_string()));
        assert!(ctx.property("endpoint").is_none());
    }

    #[test]
    fn test_response_uses_factory_writer_settings() {
        let config = crate::config::FactoryConfig {
            write_declaration: false,
            ..Default::default()
        };
        let factory = Arc::new(SoapMessageFactory::from_config(&config));
        let mut ctx = MessageContext::new(SoapMessage::new(SoapVersion::Soap11, true), factory);
        assert!(!ctx.response_mut().writer_settings().write_declaration);
    }
}
