//! Endpoint Specs
//!
//! An [`EndpointSpec`] collects the configuration of one endpoint and turns
//! it into an [`Endpoint`] with [`EndpointSpec::build`]. Specs are consumed
//! by `build`, so each one produces exactly one endpoint.
//!
//! ```ignore
//! let server = EndpointSpec::new(EndpointKind::TcpServer)
//!     .configure(|spec| spec.listen("0.0.0.0", 9000).codec(Codec::Framed))
//!     .build()?;
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::endpoint::Endpoint;
use crate::environment::Environment;
use crate::error::{EndpointError, Result};
use crate::factory::DEFAULT_BIND_ADDRESS;
use crate::kind::{EndpointKind, Role};
use crate::registry::TransportRegistry;
use crate::transport::{
    Channel, Codec, ConnectionHandler, EndpointBlueprint, TransportProvider,
    DEFAULT_CHANNEL_CAPACITY,
};

/// A host and port, resolved lazily
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SocketTarget {
    host: String,
    port: u16,
}

impl SocketTarget {
    /// Create a target from host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or IP literal
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port number
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolve to the first socket address the host maps to
    ///
    /// # Errors
    ///
    /// Returns `EndpointError::ConnectionFailed` if the lookup fails or
    /// yields no address.
    pub async fn resolve(&self) -> Result<SocketAddr> {
        let target = self.to_string();
        let first = tokio::net::lookup_host(target.clone())
            .await
            .map_err(|source| EndpointError::ConnectionFailed {
                target: target.clone(),
                source,
            })?
            .next();
        first.ok_or_else(|| EndpointError::ConnectionFailed {
            target,
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved"),
        })
    }
}

impl fmt::Display for SocketTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for SocketTarget {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (host, port) = s
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| format!("expected host:port, got '{s}'"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(format!("missing host in '{s}'"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| format!("invalid port in '{s}': {e}"))?;
        Ok(Self::new(host, port))
    }
}

impl From<SocketAddr> for SocketTarget {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl Serialize for SocketTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SocketTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Single-use configuration for one endpoint
pub struct EndpointSpec {
    kind: EndpointKind,
    implementation: Option<Arc<dyn TransportProvider>>,
    environment: Option<Arc<Environment>>,
    listen: Option<SocketTarget>,
    connect: Option<SocketTarget>,
    codec: Codec,
    handler: Option<ConnectionHandler>,
    channel_capacity: usize,
}

impl EndpointSpec {
    /// Empty spec for the given kind
    #[must_use]
    pub fn new(kind: EndpointKind) -> Self {
        Self {
            kind,
            implementation: None,
            environment: None,
            listen: None,
            connect: None,
            codec: Codec::default(),
            handler: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Kind this spec builds
    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    /// Apply a configuration function
    #[must_use]
    pub fn configure<F>(self, configure: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        configure(self)
    }

    /// Listen on `host:port` (servers)
    #[must_use]
    pub fn listen(mut self, host: impl Into<String>, port: u16) -> Self {
        self.listen = Some(SocketTarget::new(host, port));
        self
    }

    /// Listen on the default bind address
    #[must_use]
    pub fn listen_port(self, port: u16) -> Self {
        self.listen(DEFAULT_BIND_ADDRESS, port)
    }

    /// Connect to `host:port` (clients)
    #[must_use]
    pub fn connect(mut self, host: impl Into<String>, port: u16) -> Self {
        self.connect = Some(SocketTarget::new(host, port));
        self
    }

    /// Connect to the default address
    #[must_use]
    pub fn connect_port(self, port: u16) -> Self {
        self.connect(DEFAULT_BIND_ADDRESS, port)
    }

    /// Run on this environment instead of the process-wide one
    #[must_use]
    pub fn env(mut self, environment: Arc<Environment>) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Use this transport, bypassing the registry
    #[must_use]
    pub fn implementation(mut self, provider: Arc<dyn TransportProvider>) -> Self {
        self.implementation = Some(provider);
        self
    }

    /// Message boundary strategy
    #[must_use]
    pub fn codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Callback for every accepted connection
    #[must_use]
    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(Channel) + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Per-direction queue capacity of each channel
    #[must_use]
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Validate, resolve defaults and create the endpoint
    ///
    /// # Errors
    ///
    /// - `EndpointError::Configuration` if neither or both of listen/connect
    ///   are set, the address does not match the kind's role, or the channel
    ///   capacity is zero
    /// - `EndpointError::NoTransportAvailable` if no explicit implementation
    ///   was given and the registry has none for this kind
    pub fn build(self) -> Result<Endpoint> {
        let kind = self.kind;
        let address = self.bind_or_target()?;

        if self.channel_capacity == 0 {
            return Err(EndpointError::Configuration(
                "channel capacity must be at least 1".to_string(),
            ));
        }

        let environment = self.environment.or_else(|| {
            if Environment::is_active() {
                Environment::current()
            } else {
                None
            }
        });

        let provider = match self.implementation {
            Some(provider) => provider,
            None => TransportRegistry::global()
                .default_provider(kind)
                .ok_or(EndpointError::NoTransportAvailable { kind })?,
        };
        if !provider.supports(kind) {
            return Err(EndpointError::NoTransportAvailable { kind });
        }

        let blueprint = EndpointBlueprint {
            kind,
            address: address.clone(),
            environment: environment.clone(),
            codec: self.codec,
            handler: self.handler,
            channel_capacity: self.channel_capacity,
        };
        let native = provider.create(blueprint)?;

        tracing::debug!(
            %kind,
            %address,
            implementation = %provider.id(),
            environment = environment.as_ref().map(|e| e.name()),
            "Endpoint built"
        );

        Ok(Endpoint::new(kind, address, provider.id(), environment, native))
    }

    fn bind_or_target(&self) -> Result<SocketTarget> {
        match (&self.listen, &self.connect) {
            (Some(_), Some(_)) => Err(EndpointError::Configuration(format!(
                "{} has both a listen and a connect address",
                self.kind
            ))),
            (None, None) => Err(EndpointError::Configuration(format!(
                "{} needs a {} address",
                self.kind,
                match self.kind.role() {
                    Role::Server => "listen",
                    Role::Client => "connect",
                }
            ))),
            (Some(listen), None) if self.kind.role() == Role::Server => Ok(listen.clone()),
            (None, Some(connect)) if self.kind.role() == Role::Client => Ok(connect.clone()),
            (Some(listen), None) => Err(EndpointError::Configuration(format!(
                "{} is a client; use connect instead of listen({listen})",
                self.kind
            ))),
            (None, Some(connect)) => Err(EndpointError::Configuration(format!(
                "{} is a server; use listen instead of connect({connect})",
                self.kind
            ))),
        }
    }
}

impl fmt::Debug for EndpointSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointSpec")
            .field("kind", &self.kind)
            .field("implementation", &self.implementation.as_ref().map(|p| p.id()))
            .field("environment", &self.environment.as_ref().map(|e| e.name().to_string()))
            .field("listen", &self.listen)
            .field("connect", &self.connect)
            .field("codec", &self.codec)
            .field("handler", &self.handler.is_some())
            .field("channel_capacity", &self.channel_capacity)
            .finish()
    }
}
