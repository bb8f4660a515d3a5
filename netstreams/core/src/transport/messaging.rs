//! Messaging-Socket Transport
//!
//! A lightweight transport for message-oriented TCP peers. Every message is
//! a checksummed frame regardless of the codec requested on the spec, so a
//! receiver always sees whole messages.
//!
//! Only `TcpServer` and `TcpClient` are available here; other kinds need the
//! event-loop transport.

use super::codec::Codec;
use super::stream::{StreamClient, StreamServer};
use super::{EndpointBlueprint, NativeEndpoint, TransportProvider};
use crate::error::{EndpointError, Result};
use crate::kind::EndpointKind;
use crate::registry::ImplementationId;

/// Provider for framed messaging sockets
#[derive(Clone, Copy, Debug, Default)]
pub struct MessagingTransport;

impl TransportProvider for MessagingTransport {
    fn id(&self) -> ImplementationId {
        ImplementationId::MESSAGING
    }

    fn supports(&self, kind: EndpointKind) -> bool {
        matches!(kind, EndpointKind::TcpServer | EndpointKind::TcpClient)
    }

    fn create(&self, blueprint: EndpointBlueprint) -> Result<Box<dyn NativeEndpoint>> {
        if blueprint.codec != Codec::Framed {
            tracing::debug!(requested = ?blueprint.codec, "Messaging sockets always use framed codec");
        }

        match blueprint.kind {
            EndpointKind::TcpServer => Ok(Box::new(StreamServer::new(
                self.id(),
                blueprint,
                Codec::Framed,
            ))),
            EndpointKind::TcpClient => Ok(Box::new(StreamClient::new(
                self.id(),
                blueprint,
                Codec::Framed,
            ))),
            kind => Err(EndpointError::NoTransportAvailable { kind }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::SocketTarget;

    fn blueprint(kind: EndpointKind) -> EndpointBlueprint {
        EndpointBlueprint {
            kind,
            address: SocketTarget::new("127.0.0.1", 0),
            environment: None,
            codec: Codec::Raw,
            handler: None,
            channel_capacity: 8,
        }
    }

    #[test]
    fn test_forces_framed_codec() {
        let native = MessagingTransport.create(blueprint(EndpointKind::TcpClient)).unwrap();
        let client = native.as_any().downcast_ref::<StreamClient>().unwrap();
        assert_eq!(client.codec(), Codec::Framed);
        assert_eq!(client.implementation(), ImplementationId::MESSAGING);
    }

    #[test]
    fn test_rejects_non_tcp_kinds() {
        for kind in [
            EndpointKind::UdpServer,
            EndpointKind::HttpServer,
            EndpointKind::HttpClient,
        ] {
            match MessagingTransport.create(blueprint(kind)) {
                Err(EndpointError::NoTransportAvailable { kind: k }) => assert_eq!(k, kind),
                Err(other) => panic!("Expected NoTransportAvailable, got: {other}"),
                Ok(_) => panic!("Expected error for {kind}"),
            }
        }
    }
}
