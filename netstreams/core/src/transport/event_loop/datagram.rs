//! Datagram Server
//!
//! A bound UDP socket that demultiplexes datagrams by sender. The first
//! datagram from a new peer opens a [`Channel`] for it; replies sent on that
//! channel go back to the same peer.
//!
//! UDP has no hangup, so a peer that stays silent for the idle timeout is
//! dropped: its channel's `recv` returns `None` and the next datagram from
//! the same address opens a fresh channel.

use std::any::Any;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::environment::{spawn_on, Environment};
use crate::error::{EndpointError, Result};
use crate::spec::SocketTarget;
use crate::transport::channel::{Channel, ConnectionHandler};
use crate::transport::codec::Codec;
use crate::transport::stream::{error_pause, TaskTracker};
use crate::transport::{EndpointBlueprint, NativeEndpoint};

/// Largest datagram the receive loop accepts
const MAX_DATAGRAM_SIZE: usize = 65_507;

/// How long a peer may stay silent before its channel is closed
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Inbound side of one peer's channel
struct Peer {
    inbound: mpsc::Sender<Vec<u8>>,
    last_seen: Instant,
}

/// Bound UDP socket with per-peer channels
pub struct DatagramServer {
    codec: Codec,
    capacity: usize,
    handler: Option<ConnectionHandler>,
    environment: Option<Arc<Environment>>,
    idle_timeout: Duration,
    socket: Option<Arc<UdpSocket>>,
    local_addr: Option<SocketAddr>,
    tasks: TaskTracker,
}

impl DatagramServer {
    pub(crate) fn new(blueprint: EndpointBlueprint) -> Self {
        Self {
            codec: blueprint.codec,
            capacity: blueprint.channel_capacity,
            handler: blueprint.handler,
            environment: blueprint.environment,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            socket: None,
            local_addr: None,
            tasks: TaskTracker::default(),
        }
    }

    /// The bound socket, for direct `send_to` outside any channel
    pub fn socket(&self) -> Option<&Arc<UdpSocket>> {
        self.socket.as_ref()
    }

    /// Silence after which a peer's channel is closed
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Change the idle timeout; applies from the next `start`
    ///
    /// # Errors
    ///
    /// Returns `EndpointError::Configuration` for a zero timeout.
    pub fn set_idle_timeout(&mut self, timeout: Duration) -> Result<()> {
        if timeout.is_zero() {
            return Err(EndpointError::Configuration(
                "UDP idle timeout must be greater than zero".to_string(),
            ));
        }
        self.idle_timeout = timeout;
        Ok(())
    }
}

#[async_trait]
impl NativeEndpoint for DatagramServer {
    async fn start(&mut self, bind: &SocketTarget) -> Result<SocketAddr> {
        if self.socket.is_some() {
            return Err(EndpointError::InvalidState("UDP server already bound".to_string()));
        }

        let socket = UdpSocket::bind(bind.to_string())
            .await
            .map_err(|source| EndpointError::ConnectionFailed {
                target: bind.to_string(),
                source,
            })?;
        let socket = Arc::new(socket);
        let local_addr = socket.local_addr()?;

        let recv_socket = Arc::clone(&socket);
        let codec = self.codec;
        let capacity = self.capacity;
        let handler = self.handler.clone();
        let env = self.environment.clone();
        let tasks = self.tasks.clone();
        let idle_timeout = self.idle_timeout;

        let recv_loop = spawn_on(self.environment.as_ref(), async move {
            let mut peers: HashMap<SocketAddr, Peer> = HashMap::new();
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            let mut pause = error_pause();

            let mut sweep = tokio::time::interval((idle_timeout / 2).max(Duration::from_millis(1)));
            sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let (n, peer) = tokio::select! {
                    received = recv_socket.recv_from(&mut buf) => match received {
                        Ok(received) => received,
                        Err(e) => {
                            tracing::warn!(error = %e, "UDP receive error");
                            pause.tick().await;
                            continue;
                        }
                    },
                    _ = sweep.tick() => {
                        expire_idle(&mut peers, idle_timeout);
                        continue;
                    }
                };

                let Some(ref handler) = handler else {
                    tracing::trace!(%peer, bytes = n, "No handler configured; dropping datagram");
                    continue;
                };

                let mut decoder = codec.decoder();
                decoder.push(&buf[..n]);

                loop {
                    let message = match decoder.next_message() {
                        Ok(Some(message)) => message,
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!(%peer, error = %e, "Dropping malformed datagram");
                            break;
                        }
                    };

                    let entry = peers.entry(peer).or_insert_with(|| Peer {
                        inbound: open_peer(peer, &recv_socket, codec, capacity, env.as_ref(), &tasks, handler),
                        last_seen: Instant::now(),
                    });
                    entry.last_seen = Instant::now();
                    if entry.inbound.send(message).await.is_err() {
                        tracing::debug!(%peer, "Peer channel dropped");
                        peers.remove(&peer);
                    }
                }
            }
        });
        self.tasks.track(recv_loop.abort_handle());

        self.socket = Some(socket);
        self.local_addr = Some(local_addr);
        tracing::info!(addr = %local_addr, idle_timeout_ms = idle_timeout.as_millis() as u64, "UDP server bound");
        Ok(local_addr)
    }

    async fn close(&mut self) -> Result<()> {
        self.tasks.abort_all();
        self.socket = None;
        if let Some(addr) = self.local_addr.take() {
            tracing::info!(%addr, "UDP server closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drop for DatagramServer {
    fn drop(&mut self) {
        self.tasks.abort_all();
    }
}

/// Drop peers that have been silent too long or whose channel is gone
///
/// Dropping the inbound sender ends the peer's channel.
fn expire_idle(peers: &mut HashMap<SocketAddr, Peer>, idle_timeout: Duration) {
    peers.retain(|peer, state| {
        let keep = !state.inbound.is_closed() && state.last_seen.elapsed() < idle_timeout;
        if !keep {
            tracing::debug!(%peer, "UDP peer expired");
        }
        keep
    });
}

/// Open a channel for a new peer and spawn its reply task
fn open_peer(
    peer: SocketAddr,
    socket: &Arc<UdpSocket>,
    codec: Codec,
    capacity: usize,
    env: Option<&Arc<Environment>>,
    tasks: &TaskTracker,
    handler: &ConnectionHandler,
) -> mpsc::Sender<Vec<u8>> {
    let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Vec<u8>>(capacity);

    let reply_socket = Arc::clone(socket);
    let replies = spawn_on(env, async move {
        while let Some(payload) = outbound_rx.recv().await {
            let data = match codec.encode(&payload) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(%peer, error = %e, "Encode error");
                    continue;
                }
            };
            if let Err(e) = reply_socket.send_to(&data, peer).await {
                tracing::warn!(%peer, error = %e, "UDP send error");
            }
        }
    });
    tasks.track(replies.abort_handle());

    let channel = Channel::new(peer, inbound_rx, outbound_tx);
    tracing::debug!(%peer, conn = %channel.id(), "New UDP peer");
    handler(channel);
    inbound_tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::EndpointKind;

    fn blueprint(handler: Option<ConnectionHandler>) -> EndpointBlueprint {
        EndpointBlueprint {
            kind: EndpointKind::UdpServer,
            address: SocketTarget::new("127.0.0.1", 0),
            environment: None,
            codec: Codec::Raw,
            handler,
            channel_capacity: 8,
        }
    }

    #[test]
    fn test_zero_idle_timeout_rejected() {
        let mut server = DatagramServer::new(blueprint(None));
        assert_eq!(server.idle_timeout(), DEFAULT_IDLE_TIMEOUT);
        assert!(matches!(
            server.set_idle_timeout(Duration::ZERO),
            Err(EndpointError::Configuration(_))
        ));
        server.set_idle_timeout(Duration::from_millis(20)).unwrap();
        assert_eq!(server.idle_timeout(), Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_silent_peer_channel_closes() {
        let (channels_tx, mut channels_rx) = mpsc::unbounded_channel::<Channel>();
        let handler: ConnectionHandler = Arc::new(move |channel| {
            let _ = channels_tx.send(channel);
        });

        let mut server = DatagramServer::new(blueprint(Some(handler)));
        server.set_idle_timeout(Duration::from_millis(50)).unwrap();
        let addr = server.start(&SocketTarget::new("127.0.0.1", 0)).await.unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"once", addr).await.unwrap();

        let wait = Duration::from_secs(5);
        let mut first = tokio::time::timeout(wait, channels_rx.recv()).await.unwrap().unwrap();
        assert_eq!(first.recv().await.unwrap(), b"once");
        // Nothing more arrives, so the peer expires and the channel ends
        assert_eq!(tokio::time::timeout(wait, first.recv()).await.unwrap(), None);

        // The same address comes back as a new peer
        client.send_to(b"again", addr).await.unwrap();
        let mut second = tokio::time::timeout(wait, channels_rx.recv()).await.unwrap().unwrap();
        assert_ne!(second.id(), first.id());
        assert_eq!(second.recv().await.unwrap(), b"again");

        server.close().await.unwrap();
    }
}
