//! Transport Layer
//!
//! The seam between endpoint construction and the code that owns sockets.
//!
//! - [`TransportProvider`]: a named implementation that turns an
//!   [`EndpointBlueprint`] into a native handle
//! - [`NativeEndpoint`]: the native handle an [`Endpoint`](crate::Endpoint)
//!   wraps and drives
//!
//! Two providers ship with the crate, each behind a cargo feature:
//!
//! - `event-loop`: tokio sockets for every endpoint kind
//! - `messaging`: framed message sockets for TCP servers and clients
//!
//! Which ones are linked decides what the
//! [`TransportRegistry`](crate::registry::TransportRegistry) resolves by default.

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::environment::Environment;
use crate::error::{EndpointError, Result};
use crate::kind::EndpointKind;
use crate::registry::ImplementationId;
use crate::spec::SocketTarget;

pub mod channel;
pub mod codec;
#[cfg(feature = "event-loop")]
pub mod event_loop;
#[cfg(feature = "messaging")]
pub mod messaging;
#[cfg(any(feature = "event-loop", feature = "messaging"))]
pub(crate) mod stream;

pub use channel::{Channel, ConnectionHandler, ConnectionId, DEFAULT_CHANNEL_CAPACITY};
pub use codec::{Codec, Decoder, FrameDecoder, MAX_FRAME_SIZE};
#[cfg(any(feature = "event-loop", feature = "messaging"))]
pub use stream::{StreamClient, StreamServer};

/// Everything a provider needs to create a native endpoint
#[derive(Clone)]
pub struct EndpointBlueprint {
    /// Requested kind
    pub kind: EndpointKind,
    /// Listen address for servers, target address for clients
    pub address: SocketTarget,
    /// Environment tasks should run on
    pub environment: Option<Arc<Environment>>,
    /// Message boundary strategy
    pub codec: Codec,
    /// Callback for accepted connections (servers only)
    pub handler: Option<ConnectionHandler>,
    /// Per-direction queue capacity of each channel
    pub channel_capacity: usize,
}

impl std::fmt::Debug for EndpointBlueprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointBlueprint")
            .field("kind", &self.kind)
            .field("address", &self.address)
            .field("environment", &self.environment.as_ref().map(|e| e.name().to_string()))
            .field("codec", &self.codec)
            .field("handler", &self.handler.is_some())
            .field("channel_capacity", &self.channel_capacity)
            .finish()
    }
}

/// A named transport implementation
pub trait TransportProvider: Send + Sync {
    /// Identity used by the registry and in logs
    fn id(&self) -> ImplementationId;

    /// Whether this provider can build the given kind
    fn supports(&self, kind: EndpointKind) -> bool;

    /// Create the native handle for a validated blueprint
    ///
    /// # Errors
    ///
    /// Returns `EndpointError::NoTransportAvailable` for unsupported kinds.
    fn create(&self, blueprint: EndpointBlueprint) -> Result<Box<dyn NativeEndpoint>>;
}

/// The transport-native handle wrapped by an [`Endpoint`](crate::Endpoint)
///
/// Servers implement `start`; clients implement `connect`. The defaults
/// reject the call, so each handle only overrides the side it serves.
#[async_trait]
pub trait NativeEndpoint: Any + Send + Sync {
    /// Bind and begin accepting
    async fn start(&mut self, bind: &SocketTarget) -> Result<SocketAddr> {
        Err(EndpointError::InvalidState(format!(
            "{} cannot listen on {bind}",
            self.type_name()
        )))
    }

    /// Dial the target and attach a channel
    async fn connect(&mut self, target: &SocketTarget) -> Result<Channel> {
        Err(EndpointError::InvalidState(format!(
            "{} cannot connect to {target}",
            self.type_name()
        )))
    }

    /// Release the socket and stop all tasks
    async fn close(&mut self) -> Result<()>;

    /// Whether the socket is bound or connected
    fn is_open(&self) -> bool;

    /// Local socket address once open
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Borrow as `Any` for checked downcasts
    fn as_any(&self) -> &dyn Any;

    /// Mutable variant of [`NativeEndpoint::as_any`]
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Concrete type name, for diagnostics
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Look up a provider linked into this build
#[must_use]
pub fn builtin_provider(id: ImplementationId) -> Option<Arc<dyn TransportProvider>> {
    #[cfg(feature = "event-loop")]
    if id == ImplementationId::EVENT_LOOP {
        return Some(Arc::new(event_loop::EventLoopTransport));
    }

    #[cfg(feature = "messaging")]
    if id == ImplementationId::MESSAGING {
        return Some(Arc::new(messaging::MessagingTransport));
    }

    tracing::debug!(implementation = %id, "Implementation not linked into this build");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_implementation_not_linked() {
        assert!(builtin_provider(ImplementationId::new("carrier-pigeon")).is_none());
    }

    #[cfg(feature = "event-loop")]
    #[test]
    fn test_event_loop_linked() {
        let provider = builtin_provider(ImplementationId::EVENT_LOOP).unwrap();
        assert_eq!(provider.id(), ImplementationId::EVENT_LOOP);
        assert!(EndpointKind::ALL.iter().all(|k| provider.supports(*k)));
    }

    #[cfg(feature = "messaging")]
    #[test]
    fn test_messaging_linked() {
        let provider = builtin_provider(ImplementationId::MESSAGING).unwrap();
        assert!(provider.supports(EndpointKind::TcpServer));
        assert!(provider.supports(EndpointKind::TcpClient));
        assert!(!provider.supports(EndpointKind::UdpServer));
        assert!(!provider.supports(EndpointKind::HttpServer));
        assert!(!provider.supports(EndpointKind::HttpClient));
    }
}
