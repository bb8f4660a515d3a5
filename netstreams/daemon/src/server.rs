//! Daemon Server Implementation
//!
//! Builds every endpoint named in the configuration and keeps it running:
//! - Servers are started and echo each message back to its sender
//! - Clients dial with the configured reconnect policy and echo as well,
//!   reconnecting whenever the upstream goes away
//! - Live connections are tracked per endpoint until shutdown
//!
//! ```text
//!                    DaemonServer
//!                         │
//!        ┌────────────────┼────────────────┐
//!        │                │                │
//!   tcp-server       udp-server       tcp-client
//!   "ingest"         "metrics"        "upstream"
//!        │                │                │
//!    conn_…           conn_…        (reconnect loop)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use dashmap::DashMap;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use netstreams_core::transport::event_loop::{DatagramServer, DEFAULT_IDLE_TIMEOUT};
use netstreams_core::{
    delegate_as_mut, Channel, ConnectionId, Endpoint, EndpointKind, EndpointSpec, NetConfig,
    ReconnectPolicy, Role,
};

/// Name of the endpoint served when the config lists none
pub const DEFAULT_ENDPOINT: &str = "default";

/// Connection state tracking
struct ConnectionState {
    /// Endpoint that accepted or dialed the connection
    endpoint: String,
    /// Remote address
    peer: SocketAddr,
    /// When the connection was established
    connected_at: Instant,
}

/// Point-in-time view of one live connection
#[derive(Clone, Debug, Serialize)]
pub struct ConnectionInfo {
    /// Connection ID
    pub id: String,
    /// Endpoint name
    pub endpoint: String,
    /// Remote address
    pub peer: SocketAddr,
    /// Seconds since the connection was established
    pub age_secs: u64,
}

/// Configuration for the daemon server
pub struct ServerConfig {
    /// Maximum number of concurrent connections across all endpoints
    pub max_connections: usize,
    /// Silence after which a UDP peer stops counting as a connection
    pub udp_idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 1024,
            udp_idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// The main daemon server
pub struct DaemonServer {
    config: NetConfig,
    server_config: ServerConfig,
    servers: Vec<(String, Endpoint)>,
    clients: Vec<JoinHandle<()>>,
    connections: Arc<DashMap<ConnectionId, ConnectionState>>,
}

impl DaemonServer {
    /// Create a new daemon server
    pub fn new(config: NetConfig, server_config: ServerConfig) -> Self {
        Self {
            config,
            server_config,
            servers: Vec::new(),
            clients: Vec::new(),
            connections: Arc::new(DashMap::new()),
        }
    }

    /// Build and start every configured endpoint
    ///
    /// Returns the bound address of each server, by name.
    pub async fn start(&mut self) -> Result<Vec<(String, SocketAddr)>> {
        let policy = self
            .config
            .reconnect_policy()
            .context("Invalid reconnect settings")?;

        let mut specs = Vec::new();
        if self.config.endpoints.is_empty() {
            info!(
                address = %self.config.bind_address,
                port = self.config.port,
                "No endpoints configured, serving default TCP endpoint"
            );
            let mut spec = EndpointSpec::new(EndpointKind::TcpServer)
                .listen(self.config.bind_address.clone(), self.config.port)
                .channel_capacity(self.config.channel_capacity);
            if let Some(id) = self.config.transport {
                let provider = netstreams_core::transport::builtin_provider(id)
                    .with_context(|| format!("Transport '{id}' is not linked into this build"))?;
                spec = spec.implementation(provider);
            }
            specs.push((DEFAULT_ENDPOINT.to_string(), spec));
        } else {
            let mut configured = self.config.endpoints();
            let names: Vec<String> = configured.remaining().into_iter().map(str::to_string).collect();
            for name in names {
                let spec = configured
                    .take_spec(&name)
                    .with_context(|| format!("Endpoint '{name}'"))?;
                specs.push((name, spec));
            }
        }

        let mut bound = Vec::new();
        for (name, spec) in specs {
            let role = spec.kind().role();
            let spec = match role {
                Role::Server => spec.handler(self.echo_handler(&name)),
                Role::Client => spec,
            };
            let mut endpoint = spec
                .build()
                .with_context(|| format!("Failed to build endpoint '{name}'"))?;
            if endpoint.kind() == EndpointKind::UdpServer {
                delegate_as_mut::<DatagramServer>(&mut endpoint)
                    .and_then(|udp| udp.set_idle_timeout(self.server_config.udp_idle_timeout))
                    .with_context(|| format!("Failed to set UDP idle timeout on '{name}'"))?;
            }

            match role {
                Role::Server => {
                    let addr = endpoint
                        .start()
                        .await
                        .with_context(|| format!("Failed to start endpoint '{name}'"))?;
                    info!(endpoint = %name, kind = %endpoint.kind(), %addr, "Endpoint listening");
                    bound.push((name.clone(), addr));
                    self.servers.push((name, endpoint));
                }
                Role::Client => {
                    let task = tokio::spawn(run_client(
                        name,
                        endpoint,
                        policy.clone(),
                        Arc::clone(&self.connections),
                    ));
                    self.clients.push(task);
                }
            }
        }

        Ok(bound)
    }

    /// Stop every endpoint and drop all connections
    pub async fn stop(&mut self) -> Result<()> {
        for task in self.clients.drain(..) {
            task.abort();
        }
        for (name, mut endpoint) in self.servers.drain(..) {
            if let Err(e) = endpoint.stop().await {
                warn!(endpoint = %name, error = %e, "Failed to stop endpoint");
            }
        }

        let remaining = self.connections.len();
        self.connections.clear();
        info!(dropped_connections = remaining, "All endpoints stopped");
        Ok(())
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Snapshot of live connections
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.connections
            .iter()
            .map(|entry| ConnectionInfo {
                id: entry.key().to_string(),
                endpoint: entry.endpoint.clone(),
                peer: entry.peer,
                age_secs: entry.connected_at.elapsed().as_secs(),
            })
            .collect()
    }

    fn echo_handler(&self, name: &str) -> impl Fn(Channel) + Send + Sync + 'static {
        let connections = Arc::clone(&self.connections);
        let max_connections = self.server_config.max_connections;
        let name = name.to_string();

        move |channel: Channel| {
            if connections.len() >= max_connections {
                warn!(endpoint = %name, peer = %channel.peer_addr(), "Connection limit reached, rejecting new connection");
                return;
            }
            let connections = Arc::clone(&connections);
            let name = name.clone();
            tokio::spawn(async move {
                serve_channel(&name, channel, &connections).await;
            });
        }
    }
}

/// Echo until the peer goes away, tracking the connection meanwhile
async fn serve_channel(
    endpoint: &str,
    mut channel: Channel,
    connections: &DashMap<ConnectionId, ConnectionState>,
) {
    let id = channel.id();
    connections.insert(
        id,
        ConnectionState {
            endpoint: endpoint.to_string(),
            peer: channel.peer_addr(),
            connected_at: Instant::now(),
        },
    );
    info!(conn = %id, endpoint, peer = %channel.peer_addr(), active_connections = connections.len(), "Connection opened");

    while let Some(message) = channel.recv().await {
        debug!(conn = %id, bytes = message.len(), "Echoing message");
        if let Err(e) = channel.send(message).await {
            debug!(conn = %id, error = %e, "Echo failed");
            break;
        }
    }

    if let Some((_, state)) = connections.remove(&id) {
        info!(
            conn = %id,
            endpoint,
            duration_secs = state.connected_at.elapsed().as_secs(),
            "Connection closed"
        );
    }
}

/// Keep a client endpoint connected for the daemon's lifetime
async fn run_client(
    name: String,
    mut endpoint: Endpoint,
    policy: ReconnectPolicy,
    connections: Arc<DashMap<ConnectionId, ConnectionState>>,
) {
    loop {
        let channel = match endpoint.connect_with(&policy).await {
            Ok(channel) => channel,
            Err(e) => {
                warn!(endpoint = %name, error = %e, "Client endpoint gave up");
                return;
            }
        };
        serve_channel(&name, channel, &connections).await;
        info!(endpoint = %name, target = %endpoint.address(), "Upstream closed, reconnecting");
    }
}
