//! Event-Loop Transport
//!
//! The full-featured transport: tokio sockets for every endpoint kind.
//!
//! | Kind | Native handle |
//! |------|---------------|
//! | `TcpServer`, `HttpServer` | [`StreamServer`] |
//! | `TcpClient`, `HttpClient` | [`StreamClient`] |
//! | `UdpServer` | [`DatagramServer`] |
//!
//! HTTP endpoints carry raw bytes; request parsing belongs to the pipeline
//! attached through the connection handler.

mod datagram;

pub use datagram::{DatagramServer, DEFAULT_IDLE_TIMEOUT};

use super::stream::{StreamClient, StreamServer};
use super::{EndpointBlueprint, NativeEndpoint, TransportProvider};
use crate::error::Result;
use crate::kind::EndpointKind;
use crate::registry::ImplementationId;

/// Provider for the tokio event-loop transport
#[derive(Clone, Copy, Debug, Default)]
pub struct EventLoopTransport;

impl TransportProvider for EventLoopTransport {
    fn id(&self) -> ImplementationId {
        ImplementationId::EVENT_LOOP
    }

    fn supports(&self, _kind: EndpointKind) -> bool {
        true
    }

    fn create(&self, blueprint: EndpointBlueprint) -> Result<Box<dyn NativeEndpoint>> {
        let id = self.id();
        let codec = blueprint.codec;
        Ok(match blueprint.kind {
            EndpointKind::TcpServer | EndpointKind::HttpServer => {
                Box::new(StreamServer::new(id, blueprint, codec))
            }
            EndpointKind::TcpClient | EndpointKind::HttpClient => {
                Box::new(StreamClient::new(id, blueprint, codec))
            }
            EndpointKind::UdpServer => Box::new(DatagramServer::new(blueprint)),
        })
    }
}
