//! Connection Channels
//!
//! A [`Channel`] is one live connection seen from the application: inbound
//! messages arrive on a receiver, outbound messages go through a sender, and
//! the transport's background tasks move bytes between those queues and the
//! socket.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{EndpointError, Result};

/// Default per-direction queue capacity
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Callback invoked for every accepted connection
///
/// The handler must not block; spawn a task to drive the channel.
pub type ConnectionHandler = Arc<dyn Fn(Channel) + Send + Sync>;

/// Unique identifier for a connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a new random connection ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}", self.0.simple())
    }
}

/// Application side of one connection
pub struct Channel {
    id: ConnectionId,
    peer: SocketAddr,
    inbound: mpsc::Receiver<Vec<u8>>,
    outbound: mpsc::Sender<Vec<u8>>,
}

impl Channel {
    pub(crate) fn new(
        peer: SocketAddr,
        inbound: mpsc::Receiver<Vec<u8>>,
        outbound: mpsc::Sender<Vec<u8>>,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            peer,
            inbound,
            outbound,
        }
    }

    /// Two channels wired back to back, without any socket
    ///
    /// Whatever one side sends, the other receives. Useful for custom
    /// transports and tests.
    #[must_use]
    pub fn pair(peer: SocketAddr, capacity: usize) -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::channel(capacity);
        let (b_tx, b_rx) = mpsc::channel(capacity);
        (Self::new(peer, a_rx, b_tx), Self::new(peer, b_rx, a_tx))
    }

    /// Connection ID
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Queue a message for the peer
    ///
    /// # Errors
    ///
    /// Returns `EndpointError::InvalidState` once the connection is closed.
    pub async fn send(&self, payload: impl Into<Vec<u8>>) -> Result<()> {
        self.outbound
            .send(payload.into())
            .await
            .map_err(|_| EndpointError::InvalidState(format!("Channel {} closed", self.id)))
    }

    /// Wait for the next inbound message; `None` once the peer is gone
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.inbound.recv().await
    }

    /// Next inbound message if one is already queued
    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.inbound.try_recv().ok()
    }

    /// Whether the outbound side has shut down
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}
