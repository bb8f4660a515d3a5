//! Stream Sockets
//!
//! TCP server and client handles shared by the built-in transports. The
//! event-loop transport uses the codec from the spec; the messaging
//! transport always frames.

use std::any::Any;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::{Interval, MissedTickBehavior};

use super::channel::{Channel, ConnectionHandler};
use super::codec::Codec;
use super::{EndpointBlueprint, NativeEndpoint};
use crate::environment::{spawn_on, Environment};
use crate::error::{EndpointError, Result};
use crate::kind::EndpointKind;
use crate::registry::ImplementationId;
use crate::spec::SocketTarget;

const READ_BUFFER_SIZE: usize = 8192;

/// Minimum spacing between retries after a socket error that may persist
pub(crate) const SOCKET_ERROR_PAUSE: Duration = Duration::from_millis(100);

/// Pacer for accept and receive loops
///
/// The first tick completes at once; under a persistent error the loop then
/// retries at most once per [`SOCKET_ERROR_PAUSE`].
pub(crate) fn error_pause() -> Interval {
    let mut pause = tokio::time::interval(SOCKET_ERROR_PAUSE);
    pause.set_missed_tick_behavior(MissedTickBehavior::Delay);
    pause
}

/// Accept errors that concern a single connection rather than the listener
pub(crate) fn is_per_connection_error(error: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        error.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionRefused
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
    )
}

/// Abort handles for the tasks an endpoint owns
#[derive(Clone, Default)]
pub(crate) struct TaskTracker(Arc<Mutex<Vec<AbortHandle>>>);

impl TaskTracker {
    pub(crate) fn track(&self, handle: AbortHandle) {
        let mut tasks = self.0.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    pub(crate) fn abort_all(&self) {
        for task in self.0.lock().drain(..) {
            task.abort();
        }
    }

    pub(crate) fn live(&self) -> usize {
        self.0.lock().iter().filter(|t| !t.is_finished()).count()
    }
}

/// Attach read and write pumps to a connected stream
///
/// Also returns the read pump's handle; it finishes once the peer hangs up.
pub(crate) fn pump_stream(
    stream: TcpStream,
    codec: Codec,
    capacity: usize,
    env: Option<&Arc<Environment>>,
    tasks: &TaskTracker,
) -> Result<(Channel, AbortHandle)> {
    let peer = stream.peer_addr()?;
    let (mut read_half, mut write_half) = stream.into_split();

    let (inbound_tx, inbound_rx) = mpsc::channel::<Vec<u8>>(capacity);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Vec<u8>>(capacity);
    let channel = Channel::new(peer, inbound_rx, outbound_tx);
    let id = channel.id();

    // Read task: socket -> inbound queue
    let reader = spawn_on(env, async move {
        let mut decoder = codec.decoder();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        'read: loop {
            match read_half.read(&mut buf).await {
                Ok(0) => {
                    tracing::debug!(conn = %id, %peer, "Connection closed by peer");
                    break;
                }
                Ok(n) => {
                    decoder.push(&buf[..n]);
                    loop {
                        match decoder.next_message() {
                            Ok(Some(msg)) => {
                                if inbound_tx.send(msg).await.is_err() {
                                    tracing::debug!(conn = %id, "Inbound receiver dropped");
                                    break 'read;
                                }
                            }
                            Ok(None) => break,
                            Err(e) => {
                                tracing::warn!(conn = %id, error = %e, "Frame decode error");
                                break 'read;
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(conn = %id, error = %e, "Read error");
                    break;
                }
            }
        }
    });

    // Write task: outbound queue -> socket
    let writer = spawn_on(env, async move {
        while let Some(payload) = outbound_rx.recv().await {
            let data = match codec.encode(&payload) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(conn = %id, error = %e, "Encode error");
                    continue;
                }
            };
            if let Err(e) = write_half.write_all(&data).await {
                tracing::warn!(conn = %id, error = %e, "Write error");
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    let reader = reader.abort_handle();
    tasks.track(reader.clone());
    tasks.track(writer.abort_handle());

    tracing::debug!(conn = %id, %peer, ?codec, "Channel attached");
    Ok((channel, reader))
}

/// Listening stream socket
pub struct StreamServer {
    implementation: ImplementationId,
    kind: EndpointKind,
    codec: Codec,
    capacity: usize,
    handler: Option<ConnectionHandler>,
    environment: Option<Arc<Environment>>,
    local_addr: Option<SocketAddr>,
    accepted: Arc<AtomicU64>,
    tasks: TaskTracker,
}

impl StreamServer {
    pub(crate) fn new(implementation: ImplementationId, blueprint: EndpointBlueprint, codec: Codec) -> Self {
        Self {
            implementation,
            kind: blueprint.kind,
            codec,
            capacity: blueprint.channel_capacity,
            handler: blueprint.handler,
            environment: blueprint.environment,
            local_addr: None,
            accepted: Arc::new(AtomicU64::new(0)),
            tasks: TaskTracker::default(),
        }
    }

    /// Transport that created this handle
    pub fn implementation(&self) -> ImplementationId {
        self.implementation
    }

    /// Codec applied to every accepted connection
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Connections accepted since start
    pub fn accepted_connections(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Accept loop and connection tasks still running
    pub fn active_tasks(&self) -> usize {
        self.tasks.live()
    }
}

#[async_trait]
impl NativeEndpoint for StreamServer {
    async fn start(&mut self, bind: &SocketTarget) -> Result<SocketAddr> {
        if self.local_addr.is_some() {
            return Err(EndpointError::InvalidState(format!(
                "{} already listening",
                self.kind
            )));
        }

        let listener = TcpListener::bind(bind.to_string())
            .await
            .map_err(|source| EndpointError::ConnectionFailed {
                target: bind.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let kind = self.kind;
        let codec = self.codec;
        let capacity = self.capacity;
        let handler = self.handler.clone();
        let env = self.environment.clone();
        let tasks = self.tasks.clone();
        let accepted = Arc::clone(&self.accepted);

        let accept_loop = spawn_on(self.environment.as_ref(), async move {
            let mut pause = error_pause();
            loop {
                let (stream, peer) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(e) if is_per_connection_error(&e) => {
                        tracing::debug!(%kind, error = %e, "Connection failed during accept");
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(%kind, error = %e, "Accept error");
                        pause.tick().await;
                        continue;
                    }
                };
                accepted.fetch_add(1, Ordering::Relaxed);

                let Some(ref handler) = handler else {
                    tracing::debug!(%kind, %peer, "No connection handler configured; dropping connection");
                    continue;
                };

                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
                }
                match pump_stream(stream, codec, capacity, env.as_ref(), &tasks) {
                    Ok((channel, _reader)) => {
                        tracing::debug!(%kind, %peer, conn = %channel.id(), "Connection accepted");
                        handler(channel);
                    }
                    Err(e) => tracing::warn!(%kind, %peer, error = %e, "Failed to attach channel"),
                }
            }
        });
        self.tasks.track(accept_loop.abort_handle());
        self.local_addr = Some(local_addr);

        tracing::info!(%kind, implementation = %self.implementation, addr = %local_addr, "Listening");
        Ok(local_addr)
    }

    async fn close(&mut self) -> Result<()> {
        self.tasks.abort_all();
        if let Some(addr) = self.local_addr.take() {
            tracing::info!(kind = %self.kind, %addr, "Stopped listening");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.local_addr.is_some()
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

impl Drop for StreamServer {
    fn drop(&mut self) {
        self.tasks.abort_all();
    }
}

/// Dialing stream socket
pub struct StreamClient {
    implementation: ImplementationId,
    kind: EndpointKind,
    codec: Codec,
    capacity: usize,
    environment: Option<Arc<Environment>>,
    local_addr: Option<SocketAddr>,
    peer_addr: Option<SocketAddr>,
    reader: Option<AbortHandle>,
    tasks: TaskTracker,
}

impl StreamClient {
    pub(crate) fn new(implementation: ImplementationId, blueprint: EndpointBlueprint, codec: Codec) -> Self {
        Self {
            implementation,
            kind: blueprint.kind,
            codec,
            capacity: blueprint.channel_capacity,
            environment: blueprint.environment,
            local_addr: None,
            peer_addr: None,
            reader: None,
            tasks: TaskTracker::default(),
        }
    }

    /// Transport that created this handle
    pub fn implementation(&self) -> ImplementationId {
        self.implementation
    }

    /// Codec applied to the connection
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Remote address of the current connection
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr.filter(|_| self.is_live())
    }

    /// Connected and the peer has not hung up
    fn is_live(&self) -> bool {
        self.reader.as_ref().is_some_and(|reader| !reader.is_finished())
    }

    fn reset(&mut self) {
        self.tasks.abort_all();
        self.reader = None;
        self.local_addr = None;
    }
}

#[async_trait]
impl NativeEndpoint for StreamClient {
    async fn connect(&mut self, target: &SocketTarget) -> Result<Channel> {
        if self.is_live() {
            return Err(EndpointError::InvalidState("Already connected".to_string()));
        }
        if let Some(peer) = self.peer_addr.take() {
            tracing::debug!(kind = %self.kind, %peer, "Previous connection closed by peer");
            self.reset();
        }

        let stream = TcpStream::connect(target.to_string())
            .await
            .map_err(|source| EndpointError::ConnectionFailed {
                target: target.to_string(),
                source,
            })?;
        stream.set_nodelay(true)?;
        let local_addr = stream.local_addr()?;

        let (channel, reader) = pump_stream(
            stream,
            self.codec,
            self.capacity,
            self.environment.as_ref(),
            &self.tasks,
        )?;
        self.reader = Some(reader);
        self.local_addr = Some(local_addr);
        self.peer_addr = Some(channel.peer_addr());

        tracing::info!(
            kind = %self.kind,
            implementation = %self.implementation,
            peer = %channel.peer_addr(),
            "Connected"
        );
        Ok(channel)
    }

    async fn close(&mut self) -> Result<()> {
        self.reset();
        if let Some(peer) = self.peer_addr.take() {
            tracing::info!(kind = %self.kind, %peer, "Disconnected");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.is_live()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.filter(|_| self.is_live())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.tasks.abort_all();
    }
}
