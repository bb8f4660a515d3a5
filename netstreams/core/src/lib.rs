//! Netstreams Core - Endpoint Construction for Network Services
//!
//! This crate turns a short description of a network endpoint (a TCP server,
//! a UDP server, an HTTP client, ...) into a running socket, picking a
//! transport implementation automatically from what is linked into the
//! build.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Application                            │
//! │   tcp_server_on(9000)   udp_server_with(|s| ..)   config     │
//! └───────────────┬──────────────────────────────────────────────┘
//!                 │
//! ┌───────────────┴──────────────────────────────────────────────┐
//! │                        NETSTREAMS CORE                        │
//! │  ┌──────────┐   ┌──────────────┐   ┌──────────────────────┐   │
//! │  │ factory  │──▶│ EndpointSpec │──▶│ TransportRegistry    │   │
//! │  └──────────┘   └──────┬───────┘   │ (resolved once)      │   │
//! │                        │           └──────────────────────┘   │
//! │                        ▼                                      │
//! │                  ┌──────────┐      ┌──────────────────────┐   │
//! │                  │ Endpoint │◀─────│ ReconnectPolicy      │   │
//! │                  └────┬─────┘      └──────────────────────┘   │
//! └───────────────────────┼──────────────────────────────────────┘
//!                         │ NativeEndpoint
//! ┌───────────────────────┼──────────────────────────────────────┐
//! │   event-loop transport │ messaging transport                  │
//! │   (tokio, every kind)  │ (framed TCP only)                    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`EndpointSpec`]: single-use configuration for one endpoint
//! - [`Endpoint`]: a built endpoint with start/stop or connect/disconnect
//! - [`Channel`]: one live connection's inbound and outbound messages
//! - [`TransportRegistry`]: default transport per endpoint kind
//! - [`ReconnectPolicy`]: incremental backoff between connect attempts
//! - [`Environment`]: the process-wide runtime endpoints spawn onto
//!
//! # Quick Start
//!
//! ```ignore
//! use netstreams_core::{tcp_client_with, tcp_server_with, Codec};
//!
//! #[tokio::main]
//! async fn main() -> netstreams_core::Result<()> {
//!     let mut server = tcp_server_with(|spec| {
//!         spec.listen_port(9000)
//!             .codec(Codec::Framed)
//!             .handler(|mut channel| {
//!                 tokio::spawn(async move {
//!                     while let Some(msg) = channel.recv().await {
//!                         let _ = channel.send(msg).await;
//!                     }
//!                 });
//!             })
//!     })?;
//!     server.start().await?;
//!
//!     let mut client = tcp_client_with(|spec| spec.connect_port(9000).codec(Codec::Framed))?;
//!     let mut channel = client.connect().await?;
//!     channel.send(b"hello".to_vec()).await?;
//!     assert_eq!(channel.recv().await.as_deref(), Some(&b"hello"[..]));
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`kind`]: The closed set of endpoint kinds
//! - [`spec`]: Endpoint specs and socket targets
//! - [`registry`]: Transport capability probing and defaults
//! - [`endpoint`]: Built endpoints and their lifecycle
//! - [`delegate`]: Checked access to the transport-native handle
//! - [`factory`]: Convenience constructors per endpoint kind
//! - [`reconnect`]: Incremental backoff reconnect policy
//! - [`environment`]: Process-wide runtime environment
//! - [`transport`]: Transport seam, codecs, channels and built-in transports
//! - [`config`]: TOML configuration file support
//!
//! # Features
//!
//! - `event-loop` (default): tokio transport for every endpoint kind
//! - `messaging` (default): framed TCP transport

#![warn(missing_docs)]
#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod delegate;
pub mod endpoint;
pub mod environment;
pub mod error;
pub mod factory;
pub mod kind;
pub mod reconnect;
pub mod registry;
pub mod spec;
pub mod transport;

// Re-exports for convenience
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfiguredEndpoints, NetConfig,
};
pub use delegate::{delegate, delegate_as, delegate_as_mut};
pub use endpoint::Endpoint;
pub use environment::Environment;
pub use error::{EndpointError, Result};
pub use factory::*;
pub use kind::{EndpointKind, Role};
pub use reconnect::{backoff_reconnect, BackoffReconnect, Reconnect, ReconnectPolicy, ReconnectState};
pub use registry::{
    default_implementation, CapabilityProbe, ImplementationId, LinkedCapabilities,
    TransportRegistry,
};
pub use spec::{EndpointSpec, SocketTarget};
pub use transport::{
    Channel, Codec, ConnectionHandler, ConnectionId, EndpointBlueprint, NativeEndpoint,
    TransportProvider,
};
