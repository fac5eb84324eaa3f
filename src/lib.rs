//! Streaming SOAP message handling
//!
//! Reads and writes SOAP 1.1 and 1.2 messages as XML event streams. The body
//! payload stays on the wire until it is asked for, so large requests are
//! processed without building a tree for the whole envelope.
//!
//! # Features
//!
//! - Composite event readers that chain several event sources into one stream
//! - Version descriptors for SOAP 1.1 and SOAP 1.2
//! - Envelope, header, body and fault model with optional payload caching
//! - Message factory with shared, preconfigured XML reader/writer settings
//! - Error-to-fault mapping resolved by error hierarchy distance
//! - A small TCP receiver dispatching requests to endpoints
//!
//! # Example
//!
//! ```ignore
//! use streaming_soap::{SoapMessageFactory, SoapVersion};
//!
//! let factory = SoapMessageFactory::new(SoapVersion::Soap12);
//! let mut message = factory.create_message_from(std::io::stdin())?;
//! if let Some(payload) = message.payload()? {
//!     println!("{}", payload.name);
//! }
//! ```

pub mod body;
pub mod composite;
pub mod config;
pub mod connection;
pub mod context;
pub mod definition;
pub mod error;
pub mod event;
pub mod factory;
pub mod fault;
pub mod header;
pub mod message;
pub mod reader;
pub mod resolver;
pub mod server;
pub mod tree;
pub mod version;
pub mod writer;

pub use body::{PayloadSource, SoapBody};
pub use composite::CompositeEventReader;
pub use config::StreamingSoapConfig;
pub use connection::{ReceiverConnection, TcpReceiverConnection};
pub use context::MessageContext;
pub use definition::{FaultCode, SoapFaultDefinition};
pub use error::{SoapError, XmlStreamError};
pub use event::{Attribute, Namespace, QName, XmlEvent};
pub use factory::{SoapMessageFactory, XmlResources};
pub use fault::{FaultDetail, Soap11Fault, Soap12Fault, SoapFault};
pub use header::SoapHeader;
pub use message::{SoapEnvelope, SoapMessage};
pub use reader::{BufferedEventReader, EventReader, QuickXmlEventReader};
pub use resolver::{
    EndpointError, EndpointErrorResolver, ErrorHierarchy, SimpleSoapFaultResolver,
    SoapFaultMappingResolver, TypeHierarchy,
};
pub use server::{EchoEndpoint, Endpoint, SoapServer};
pub use tree::Element;
pub use version::SoapVersion;
