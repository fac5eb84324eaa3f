//! Request processing: read a message, dispatch it to an endpoint, turn
//! endpoint errors into faults and write the response.

use crate::config::StreamingSoapConfig;
use crate::connection::ReceiverConnection;
use crate::context::MessageContext;
use crate::error::SoapError;
use crate::event::QName;
use crate::factory::SoapMessageFactory;
use crate::fault::DEFAULT_FAULT_LANGUAGE;
use crate::message::SoapMessage;
use crate::resolver::{
    resolve_with, EndpointError, EndpointErrorResolver, SimpleSoapFaultResolver,
    SoapFaultMappingResolver,
};
use std::collections::HashMap;
use std::io::{self, Cursor, Read};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Type name reported when no endpoint accepts a request.
pub const NO_ENDPOINT_ERROR: &str = "streaming_soap::server::NoEndpointFound";

/// Application code handling requests.
pub trait Endpoint: Send + Sync {
    /// Name used for logging and endpoint patterns of fault resolvers.
    fn name(&self) -> &str;

    /// Whether the endpoint processes mustUnderstand header elements named `header`.
    fn understands(&self, _header: &QName) -> bool {
        false
    }

    /// Process the request in `context`, creating a response if there is one.
    fn invoke(&self, context: &mut MessageContext) -> Result<(), EndpointError>;
}

/// Answers every request with a copy of its payload.
#[derive(Debug, Clone, Default)]
pub struct EchoEndpoint;

impl Endpoint for EchoEndpoint {
    fn name(&self) -> &str {
        "echo"
    }

    fn invoke(&self, context: &mut MessageContext) -> Result<(), EndpointError> {
        let payload = context
            .request_mut()
            .payload()
            .map_err(|e| EndpointError::of(&e))?;
        let action = context.request().soap_action().map(str::to_string);
        let response = context.response_mut();
        if let Some(payload) = payload {
            response.set_payload(payload);
        }
        if let Some(action) = action {
            response.set_soap_action(action);
        }
        Ok(())
    }
}

/// Dispatches requests to endpoints by payload root element.
pub struct SoapServer {
    factory: Arc<SoapMessageFactory>,
    endpoints: HashMap<QName, Arc<dyn Endpoint>>,
    default_endpoint: Option<Arc<dyn Endpoint>>,
    resolvers: Vec<Box<dyn EndpointErrorResolver>>,
    max_request_size: u64,
    /// Metrics tracking
    requests_processed: AtomicU64,
    faults_returned: AtomicU64,
}

impl SoapServer {
    pub fn new(factory: Arc<SoapMessageFactory>) -> Self {
        Self {
            factory,
            endpoints: HashMap::new(),
            default_endpoint: None,
            resolvers: Vec::new(),
            max_request_size: u64::MAX,
            requests_processed: AtomicU64::new(0),
            faults_returned: AtomicU64::new(0),
        }
    }

    /// Server with the configured factory and fault resolvers.
    pub fn from_config(config: &StreamingSoapConfig) -> Result<Self, SoapError> {
        let factory = Arc::new(SoapMessageFactory::from_config(&config.factory));
        let mut server = Self::new(factory);
        server.max_request_size = config.settings.max_request_size as u64;
        server.add_resolver(Box::new(SoapFaultMappingResolver::from_config(&config.faults)?));
        if config.faults.generic_fallback {
            server.add_resolver(Box::new(SimpleSoapFaultResolver));
        }
        Ok(server)
    }

    pub fn factory(&self) -> &Arc<SoapMessageFactory> {
        &self.factory
    }

    /// Route requests whose payload root element is `payload_root` to `endpoint`.
    pub fn register_endpoint(&mut self, payload_root: QName, endpoint: Arc<dyn Endpoint>) {
        self.endpoints.insert(payload_root, endpoint);
    }

    /// Endpoint for requests no registered payload root matches.
    pub fn set_default_endpoint(&mut self, endpoint: Arc<dyn Endpoint>) {
        self.default_endpoint = Some(endpoint);
    }

    pub fn add_resolver(&mut self, resolver: Box<dyn EndpointErrorResolver>) {
        self.resolvers.push(resolver);
    }

    pub fn set_max_request_size(&mut self, max_request_size: u64) {
        self.max_request_size = max_request_size;
    }

    pub fn requests_processed(&self) -> u64 {
        self.requests_processed.load(Ordering::Relaxed)
    }

    pub fn faults_returned(&self) -> u64 {
        self.faults_returned.load(Ordering::Relaxed)
    }

    /// Serve one request over `connection`.
    pub fn handle_connection<C: ReceiverConnection>(&self, mut connection: C) -> Result<(), SoapError> {
        let uri = connection.uri();
        debug!(uri = %uri, "Accepted connection");
        let input = connection.input_stream()?;
        let response = self.handle(input);
        if let Some(mut response) = response {
            let output = connection.output_stream()?;
            self.factory.write_message(&mut response, output)?;
        }
        connection.close()?;
        Ok(())
    }

    /// Process one request; `None` when the endpoint produced no response.
    pub fn handle<R: Read + Send + 'static>(&self, input: R) -> Option<SoapMessage> {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);

        let exceeded = Arc::new(AtomicBool::new(false));
        let input = SizeLimited::new(input, self.max_request_size, Arc::clone(&exceeded));
        let request = match self.factory.create_message_from(input) {
            Ok(request) => request,
            Err(e) => {
                let e = if exceeded.load(Ordering::Relaxed) {
                    SoapError::RequestTooLarge(self.max_request_size)
                } else {
                    e
                };
                warn!(error = %e, "Could not read SOAP request");
                let mut response = self.factory.create_message();
                response
                    .soap_body_mut()
                    .add_client_or_sender_fault(e.to_string(), Some(DEFAULT_FAULT_LANGUAGE));
                return Some(self.count(response));
            }
        };

        let mut context = MessageContext::new(request, Arc::clone(&self.factory));
        self.dispatch(&mut context);
        context.take_response().map(|response| self.count(response))
    }

    /// Convenience for in-memory requests.
    pub fn handle_bytes(&self, request: Vec<u8>) -> Result<Option<Vec<u8>>, SoapError> {
        match self.handle(Cursor::new(request)) {
            Some(mut response) => Ok(Some(self.factory.write_message(&mut response, Vec::new())?)),
            None => Ok(None),
        }
    }

    fn dispatch(&self, context: &mut MessageContext) {
        let payload_root = match context.request_mut().soap_body_mut().payload_root_name() {
            Ok(root) => root,
            Err(e) => {
                self.resolve(context, None, &EndpointError::of(&e));
                return;
            }
        };

        let endpoint = payload_root
            .as_ref()
            .and_then(|root| self.endpoints.get(root))
            .or(self.default_endpoint.as_ref())
            .cloned();
        let Some(endpoint) = endpoint else {
            let root = payload_root.map(|r| r.to_string()).unwrap_or_default();
            let error = EndpointError::new(NO_ENDPOINT_ERROR)
                .with_message(format!("No endpoint found for [{}]", root));
            self.resolve(context, None, &error);
            return;
        };

        if let Some(header) = self.not_understood_header(context, endpoint.as_ref()) {
            warn!(endpoint = endpoint.name(), header = %header, "Header not understood");
            context.clear_response();
            context.response_mut().soap_body_mut().add_must_understand_fault(
                format!("One or more mandatory SOAP header blocks not understood: {}", header),
                Some(DEFAULT_FAULT_LANGUAGE),
            );
            return;
        }

        debug!(endpoint = endpoint.name(), root = ?payload_root, "Invoking endpoint");
        if let Err(error) = endpoint.invoke(context) {
            info!(endpoint = endpoint.name(), error = %error, "Endpoint raised error");
            self.resolve(context, Some(endpoint.name()), &error);
        }
    }

    fn not_understood_header(&self, context: &MessageContext, endpoint: &dyn Endpoint) -> Option<QName> {
        let header = context.request().header()?;
        let name = header
            .examine_must_understand_header_elements(&[])
            .find(|element| !endpoint.understands(&element.name))
            .map(|element| element.name.clone());
        name
    }

    fn resolve(&self, context: &mut MessageContext, endpoint: Option<&str>, error: &EndpointError) {
        context.clear_response();
        if !resolve_with(&self.resolvers, context, endpoint, error) {
            warn!(error = %error, "No resolver handled error, returning generic fault");
            context
                .response_mut()
                .soap_body_mut()
                .add_server_or_receiver_fault(error.to_string(), Some(DEFAULT_FAULT_LANGUAGE));
        }
    }

    fn count(&self, response: SoapMessage) -> SoapMessage {
        if response.has_fault() {
            self.faults_returned.fetch_add(1, Ordering::Relaxed);
        }
        response
    }
}

/// Fails reads once the input is longer than `limit` bytes.
struct SizeLimited<R> {
    inner: R,
    limit: u64,
    remaining: u64,
    exceeded: Arc<AtomicBool>,
}

impl<R> SizeLimited<R> {
    fn new(inner: R, limit: u64, exceeded: Arc<AtomicBool>) -> Self {
        Self {
            inner,
            limit,
            remaining: limit,
            exceeded,
        }
    }
}

impl<R: Read> Read for SizeLimited<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // one byte past the limit tells an oversized input from one that fits exactly
        let allowed = usize::try_from(self.remaining.saturating_add(1)).unwrap_or(usize::MAX);
        let len = buf.len().min(allowed);
        let n = self.inner.read(&mut buf[..len])?;
        if n as u64 > self.remaining {
            self.exceeded.store(true, Ordering::Relaxed);
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                SoapError::RequestTooLarge(self.limit).to_string(),
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::{SoapVersion, SOAP_11_NS};

    struct Failing;

    impl Endpoint for Failing {
        fn name(&self) -> &str {
            "orders/fail"
        }

        fn invoke(&self, _context: &mut MessageContext) -> Result<(), EndpointError> {
            Err(EndpointError::new("orders::OrderNotFound").with_message("order 7"))
        }
    }

    struct OneWay;

    impl Endpoint for OneWay {
        fn name(&self) -> &str {
            "notify"
        }

        fn invoke(&self, _context: &mut MessageContext) -> Result<(), EndpointError> {
            Ok(())
        }
    }

    fn request(payload: &str) -> Vec<u8> {
        format!(
            r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="{}"><SOAP-ENV:Body>{}</SOAP-ENV:Body></SOAP-ENV:Envelope>"#,
            SOAP_11_NS, payload
        )
        .into_bytes()
    }

    fn server() -> SoapServer {
        let mut server = SoapServer::new(Arc::new(SoapMessageFactory::new(SoapVersion::Soap11)));
        server.set_default_endpoint(Arc::new(EchoEndpoint));
        server
    }

    fn response_text(server: &SoapServer, body: Vec<u8>) -> String {
        String::from_utf8(server.handle_bytes(body).unwrap().unwrap()).unwrap()
    }

    #[test]
    fn test_echo() {
        let server = server();
        let xml = response_text(&server, request(r#"<p:Ping xmlns:p="urn:p">hi</p:Ping>"#));
        assert!(xml.contains(r#"<p:Ping xmlns:p="urn:p">hi</p:Ping>"#));
        assert_eq!(server.requests_processed(), 1);
        assert_eq!(server.faults_returned(), 0);
    }

    #[test]
    fn test_endpoint_error_resolved() {
        let mut server = server();
        server.register_endpoint(QName::new("urn:o", "GetOrder"), Arc::new(Failing));
        let mut resolver = SoapFaultMappingResolver::new(Arc::new(
            crate::resolver::ErrorHierarchy::new(),
        ));
        resolver.add_mapping("OrderNotFound", "CLIENT, Unknown order".parse().unwrap());
        server.add_resolver(Box::new(resolver));

        let xml = response_text(&server, request(r#"<GetOrder xmlns="urn:o"/>"#));
        assert!(xml.contains("SOAP-ENV:Client"));
        assert!(xml.contains("Unknown order"));
        assert_eq!(server.faults_returned(), 1);
    }

    #[test]
    fn test_unresolved_error_becomes_server_fault() {
        let mut server = server();
        server.register_endpoint(QName::new("urn:o", "GetOrder"), Arc::new(Failing));
        let xml = response_text(&server, request(r#"<GetOrder xmlns="urn:o"/>"#));
        assert!(xml.contains("SOAP-ENV:Server"));
        assert!(xml.contains("order 7"));
    }

    #[test]
    fn test_no_endpoint() {
        let server = SoapServer::new(Arc::new(SoapMessageFactory::default()));
        let xml = response_text(&server, request(r#"<Unknown/>"#));
        assert!(xml.contains("No endpoint found for [Unknown]"));
    }

    #[test]
    fn test_invalid_request_is_client_fault() {
        let server = server();
        let xml = response_text(&server, b"<not-soap/>".to_vec());
        assert!(xml.contains("SOAP-ENV:Client"));
    }

    #[test]
    fn test_one_way_endpoint() {
        let mut server = server();
        server.set_default_endpoint(Arc::new(OneWay));
        assert!(server.handle_bytes(request("<Note/>")).unwrap().is_none());
    }

    #[test]
    fn test_must_understand_header() {
        let server = server();
        let body = format!(
            r#"<S:Envelope xmlns:S="{}"><S:Header><t:Tx xmlns:t="urn:t" S:mustUnderstand="1">1</t:Tx></S:Header><S:Body><Ping/></S:Body></S:Envelope>"#,
            SOAP_11_NS
        );
        let xml = response_text(&server, body.into_bytes());
        assert!(xml.contains("SOAP-ENV:MustUnderstand"));
        assert!(xml.contains("{urn:t}Tx"));
    }

    #[test]
    fn test_oversized_request_reports_size_limit() {
        let mut server = server();
        server.set_max_request_size(64);
        let xml = response_text(&server, request(&format!("<Big>{}</Big>", "x".repeat(200))));
        assert!(xml.contains("SOAP-ENV:Client"));
        assert!(xml.contains("exceeds the maximum size of 64 bytes"));
    }

    #[test]
    fn test_request_of_exactly_max_size_accepted() {
        let body = request("<Ping/>");
        let mut server = server();
        server.set_max_request_size(body.len() as u64);
        let xml = response_text(&server, body);
        assert!(xml.contains("<Ping></Ping>"));
        assert_eq!(server.faults_returned(), 0);
    }

    #[test]
    fn test_size_limited_reader() {
        let exceeded = Arc::new(AtomicBool::new(false));
        let mut reader = SizeLimited::new(Cursor::new(b"12345".to_vec()), 4, Arc::clone(&exceeded));
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(exceeded.load(Ordering::Relaxed));
    }
}
