//! TOML Configuration File Support
//!
//! Loads endpoint defaults, the reconnect policy and a list of named
//! endpoints from `~/.config/netstreams/netstreams.toml`.
//!
//! # Configuration Priority
//!
//! Values are applied with the following priority (highest first):
//! 1. CLI arguments, through [`ConfigOverrides`]
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [defaults]
//! bind_address = "0.0.0.0"
//! port = 12012
//! transport = "event-loop"
//! channel_capacity = 256
//!
//! [reconnect]
//! initial_delay_ms = 500
//! multiplier = 2.0
//! max_delay_ms = 30000
//! max_attempts = 10
//! jitter = 0.2
//! addresses = ["10.0.0.2:12012", "10.0.0.3:12012"]
//!
//! [[endpoint]]
//! name = "ingest"
//! kind = "tcp-server"
//! port = 9000
//! codec = "framed"
//!
//! [[endpoint]]
//! name = "upstream"
//! kind = "tcp-client"
//! address = "10.0.0.1"
//! port = 9100
//! transport = "messaging"
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::EndpointError;
use crate::factory::{DEFAULT_BIND_ADDRESS, DEFAULT_PORT};
use crate::kind::{EndpointKind, Role};
use crate::reconnect::{
    backoff_reconnect, ReconnectPolicy, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY,
    DEFAULT_MULTIPLIER,
};
use crate::registry::ImplementationId;
use crate::spec::{EndpointSpec, SocketTarget};
use crate::transport::{builtin_provider, Codec, DEFAULT_CHANNEL_CAPACITY};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Tracks where the configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[defaults]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsToml {
    /// Address endpoints bind or dial when they name none
    pub bind_address: Option<String>,

    /// Port endpoints use when they name none
    pub port: Option<u16>,

    /// Transport used instead of the registry default
    pub transport: Option<ImplementationId>,

    /// Per-direction queue capacity of each channel
    pub channel_capacity: Option<usize>,
}

/// `[reconnect]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectToml {
    /// Delay before the first reconnect in milliseconds
    pub initial_delay_ms: Option<u64>,

    /// Growth factor between attempts
    pub multiplier: Option<f64>,

    /// Ceiling on any single delay in milliseconds
    pub max_delay_ms: Option<u64>,

    /// Reconnects before giving up (absent = unbounded)
    pub max_attempts: Option<u32>,

    /// Random spread as a fraction of each delay
    pub jitter: Option<f64>,

    /// Failover addresses rotated through on reconnect
    pub addresses: Vec<SocketTarget>,
}

/// One `[[endpoint]]` entry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndpointToml {
    /// Unique name the endpoint is requested by
    pub name: String,

    /// Endpoint kind, e.g. `tcp-server`
    pub kind: EndpointKind,

    /// Listen or connect address
    pub address: Option<String>,

    /// Listen or connect port
    pub port: Option<u16>,

    /// Message boundary strategy
    pub codec: Option<Codec>,

    /// Transport override for this endpoint only
    pub transport: Option<ImplementationId>,

    /// Queue capacity override for this endpoint only
    pub channel_capacity: Option<usize>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetstreamsToml {
    /// Defaults section
    pub defaults: DefaultsToml,

    /// Reconnect section
    pub reconnect: ReconnectToml,

    /// Named endpoints
    #[serde(rename = "endpoint")]
    pub endpoints: Vec<EndpointToml>,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Reconnect settings after defaults are applied
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReconnectSettings {
    /// Delay before the first reconnect in milliseconds
    pub initial_delay_ms: u64,
    /// Growth factor between attempts
    pub multiplier: f64,
    /// Ceiling on any single delay in milliseconds
    pub max_delay_ms: u64,
    /// Reconnects before giving up
    pub max_attempts: Option<u32>,
    /// Random spread as a fraction of each delay
    pub jitter: f64,
    /// Failover addresses
    pub addresses: Vec<SocketTarget>,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: DEFAULT_INITIAL_DELAY.as_millis() as u64,
            multiplier: DEFAULT_MULTIPLIER,
            max_delay_ms: DEFAULT_MAX_DELAY.as_millis() as u64,
            max_attempts: None,
            jitter: 0.0,
            addresses: Vec::new(),
        }
    }
}

/// A named endpoint after defaults are applied
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EndpointConfig {
    /// Unique name
    pub name: String,
    /// Endpoint kind
    pub kind: EndpointKind,
    /// Listen address for servers, target for clients
    pub address: SocketTarget,
    /// Message boundary strategy
    pub codec: Codec,
    /// Explicit transport, if any
    pub transport: Option<ImplementationId>,
    /// Per-direction queue capacity
    pub channel_capacity: usize,
}

/// Configuration merged from defaults, file and environment
#[derive(Clone, Debug, Serialize)]
pub struct NetConfig {
    /// Address endpoints bind or dial when they name none
    pub bind_address: String,

    /// Port endpoints use when they name none
    pub port: u16,

    /// Transport used instead of the registry default
    pub transport: Option<ImplementationId>,

    /// Per-direction queue capacity of each channel
    pub channel_capacity: usize,

    /// Reconnect policy settings
    pub reconnect: ReconnectSettings,

    /// Named endpoints, in file order
    pub endpoints: Vec<EndpointConfig>,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    #[serde(skip)]
    source: ConfigSource,

    #[serde(skip)]
    raw_endpoints: Vec<EndpointToml>,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            transport: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            reconnect: ReconnectSettings::default(),
            endpoints: Vec::new(),
            config_file_path: None,
            source: ConfigSource::Default,
            raw_endpoints: Vec::new(),
        }
    }
}

impl NetConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Build the reconnect policy these settings describe
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if the settings are rejected
    /// by the policy builder.
    pub fn reconnect_policy(&self) -> Result<ReconnectPolicy, ConfigError> {
        let settings = &self.reconnect;
        let builder = backoff_reconnect()
            .initial_delay(Duration::from_millis(settings.initial_delay_ms))
            .multiplier(settings.multiplier)
            .max_delay(Duration::from_millis(settings.max_delay_ms))
            .jitter(settings.jitter)
            .addresses(settings.addresses.iter().cloned());
        let builder = match settings.max_attempts {
            Some(attempts) => builder.max_attempts(attempts),
            None => builder.unbounded(),
        };
        builder
            .build()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    /// Hand out the named endpoints as single-use specs
    #[must_use]
    pub fn endpoints(&self) -> ConfiguredEndpoints {
        ConfiguredEndpoints {
            entries: self.endpoints.clone(),
            taken: HashSet::new(),
        }
    }

    /// Look up a named endpoint
    pub fn endpoint(&self, name: &str) -> Option<&EndpointConfig> {
        self.endpoints.iter().find(|e| e.name == name)
    }

    /// Check invariants that span several values
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` naming the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "defaults.channel_capacity must be at least 1".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for endpoint in &self.endpoints {
            if endpoint.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "endpoint name must not be empty".to_string(),
                ));
            }
            if !names.insert(endpoint.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate endpoint name '{}'",
                    endpoint.name
                )));
            }
            if endpoint.channel_capacity == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "endpoint '{}' channel_capacity must be at least 1",
                    endpoint.name
                )));
            }
        }

        self.reconnect_policy().map(|_| ())
    }

    /// Re-derive every endpoint from its raw entry and the current defaults
    fn resolve_endpoints(&mut self) {
        self.endpoints = self
            .raw_endpoints
            .iter()
            .map(|raw| EndpointConfig {
                name: raw.name.clone(),
                kind: raw.kind,
                address: SocketTarget::new(
                    raw.address.clone().unwrap_or_else(|| self.bind_address.clone()),
                    raw.port.unwrap_or(self.port),
                ),
                codec: raw.codec.unwrap_or_default(),
                transport: raw.transport.or(self.transport),
                channel_capacity: raw.channel_capacity.unwrap_or(self.channel_capacity),
            })
            .collect();
    }
}

/// Named endpoint specs, each handed out once
#[derive(Debug)]
pub struct ConfiguredEndpoints {
    entries: Vec<EndpointConfig>,
    taken: HashSet<String>,
}

impl ConfiguredEndpoints {
    /// Names of endpoints not yet taken, in file order
    pub fn remaining(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| !self.taken.contains(&e.name))
            .map(|e| e.name.as_str())
            .collect()
    }

    /// Take the spec for a named endpoint
    ///
    /// # Errors
    ///
    /// - `EndpointError::AlreadyBuilt` if this name was already taken
    /// - `EndpointError::Configuration` if no endpoint has this name or its
    ///   transport is not linked into this build
    pub fn take_spec(&mut self, name: &str) -> Result<EndpointSpec, EndpointError> {
        if self.taken.contains(name) {
            return Err(EndpointError::AlreadyBuilt {
                name: name.to_string(),
            });
        }
        let entry = self
            .entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| EndpointError::Configuration(format!("no endpoint named '{name}'")))?;

        let host = entry.address.host().to_string();
        let port = entry.address.port();
        let mut spec = EndpointSpec::new(entry.kind)
            .codec(entry.codec)
            .channel_capacity(entry.channel_capacity);
        spec = match entry.kind.role() {
            Role::Server => spec.listen(host, port),
            Role::Client => spec.connect(host, port),
        };
        if let Some(id) = entry.transport {
            let provider = builtin_provider(id).ok_or_else(|| {
                EndpointError::Configuration(format!(
                    "endpoint '{name}' requests transport '{id}', which is not linked into this build"
                ))
            })?;
            spec = spec.implementation(provider);
        }

        self.taken.insert(name.to_string());
        Ok(spec)
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/netstreams/netstreams.toml` or
/// `~/.config/netstreams/netstreams.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("netstreams").join("netstreams.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or the
/// merged values are invalid. A missing config file is not an error.
pub fn load_config() -> Result<NetConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Arguments
///
/// * `path` - Optional path to the configuration file. If `None`, only defaults
///   and environment variables are used.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or the merged values are invalid.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<NetConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<NetConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = NetConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: NetstreamsToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                endpoints = config.raw_endpoints.len(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env)?;
    config.resolve_endpoints();
    config.validate()?;
    Ok(config)
}

fn apply_toml_config(config: &mut NetConfig, toml: NetstreamsToml) {
    if let Some(address) = toml.defaults.bind_address {
        config.bind_address = address;
    }
    if let Some(port) = toml.defaults.port {
        config.port = port;
    }
    if toml.defaults.transport.is_some() {
        config.transport = toml.defaults.transport;
    }
    if let Some(capacity) = toml.defaults.channel_capacity {
        config.channel_capacity = capacity;
    }

    let reconnect = &mut config.reconnect;
    if let Some(ms) = toml.reconnect.initial_delay_ms {
        reconnect.initial_delay_ms = ms;
    }
    if let Some(multiplier) = toml.reconnect.multiplier {
        reconnect.multiplier = multiplier;
    }
    if let Some(ms) = toml.reconnect.max_delay_ms {
        reconnect.max_delay_ms = ms;
    }
    if toml.reconnect.max_attempts.is_some() {
        reconnect.max_attempts = toml.reconnect.max_attempts;
    }
    if let Some(jitter) = toml.reconnect.jitter {
        reconnect.jitter = jitter;
    }
    reconnect.addresses = toml.reconnect.addresses;

    config.raw_endpoints = toml.endpoints;
}

fn apply_env_config<F>(config: &mut NetConfig, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(address) = env("NETSTREAMS_BIND_ADDRESS") {
        config.bind_address = address;
        config.source = ConfigSource::Env;
    }
    if let Some(port) = env("NETSTREAMS_PORT") {
        config.port = port.parse().map_err(|e| {
            ConfigError::ValidationError(format!("NETSTREAMS_PORT='{port}': {e}"))
        })?;
        config.source = ConfigSource::Env;
    }
    if let Some(name) = env("NETSTREAMS_TRANSPORT") {
        let id = ImplementationId::builtin(&name).ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "NETSTREAMS_TRANSPORT='{name}' (expected 'event-loop' or 'messaging')"
            ))
        })?;
        config.transport = Some(id);
        config.source = ConfigSource::Env;
    }
    if let Some(attempts) = env("NETSTREAMS_RECONNECT_ATTEMPTS") {
        if let Ok(n) = attempts.parse::<u32>() {
            config.reconnect.max_attempts = Some(n);
            config.source = ConfigSource::Env;
        } else {
            tracing::warn!(value = %attempts, "Ignoring unparseable NETSTREAMS_RECONNECT_ATTEMPTS");
        }
    }
    Ok(())
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Command-line overrides applied after [`load_config`]
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Bind address override
    pub bind_address: Option<String>,

    /// Port override
    pub port: Option<u16>,

    /// Transport override
    pub transport: Option<ImplementationId>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bind address override
    #[must_use]
    pub fn with_bind_address(mut self, address: String) -> Self {
        self.bind_address = Some(address);
        self
    }

    /// Set port override
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set transport override
    #[must_use]
    pub fn with_transport(mut self, transport: ImplementationId) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Apply overrides and re-derive endpoints that inherit the defaults
    pub fn apply(&self, config: &mut NetConfig) {
        if self.bind_address.is_none() && self.port.is_none() && self.transport.is_none() {
            return;
        }
        config.source = ConfigSource::Cli;

        if let Some(ref address) = self.bind_address {
            config.bind_address = address.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.transport.is_some() {
            config.transport = self.transport;
        }
        config.resolve_endpoints();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn load(content: &str) -> Result<NetConfig, ConfigError> {
        let file = write_config(content);
        load_config_with_env(Some(file.path().to_path_buf()), no_env)
    }

    // =========================================================================
    // Default Configuration Tests
    // =========================================================================

    #[test]
    fn test_default_config() {
        let config = load_config_with_env(None, no_env).unwrap();

        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.port, 12012);
        assert_eq!(config.transport, None);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.reconnect, ReconnectSettings::default());
        assert!(config.endpoints.is_empty());
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_default_config_path() {
        if let Some(p) = default_config_path() {
            assert!(p.ends_with("netstreams/netstreams.toml"));
        }
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            load_config_with_env(Some(dir.path().join("absent.toml")), no_env).unwrap();
        assert_eq!(config.config_file_path, None);
        assert_eq!(config.source(), ConfigSource::Default);
    }

    // =========================================================================
    // TOML Parsing Tests
    // =========================================================================

    #[test]
    fn test_parse_full_toml() {
        let config = load(
            r#"
[defaults]
bind_address = "0.0.0.0"
port = 7000
transport = "messaging"
channel_capacity = 64

[reconnect]
initial_delay_ms = 100
multiplier = 3.0
max_delay_ms = 5000
max_attempts = 4
jitter = 0.1
addresses = ["10.0.0.2:7000"]

[[endpoint]]
name = "ingest"
kind = "tcp-server"
port = 9000
codec = "framed"

[[endpoint]]
name = "metrics"
kind = "udp-server"
transport = "event-loop"

[[endpoint]]
name = "upstream"
kind = "tcp-client"
address = "10.0.0.1"
channel_capacity = 8
"#,
        )
        .unwrap();

        assert_eq!(config.source(), ConfigSource::File);
        assert_eq!(config.transport, Some(ImplementationId::MESSAGING));
        assert_eq!(
            config.reconnect,
            ReconnectSettings {
                initial_delay_ms: 100,
                multiplier: 3.0,
                max_delay_ms: 5000,
                max_attempts: Some(4),
                jitter: 0.1,
                addresses: vec![SocketTarget::new("10.0.0.2", 7000)],
            }
        );

        assert_eq!(
            config.endpoints,
            vec![
                EndpointConfig {
                    name: "ingest".to_string(),
                    kind: EndpointKind::TcpServer,
                    address: SocketTarget::new("0.0.0.0", 9000),
                    codec: Codec::Framed,
                    transport: Some(ImplementationId::MESSAGING),
                    channel_capacity: 64,
                },
                EndpointConfig {
                    name: "metrics".to_string(),
                    kind: EndpointKind::UdpServer,
                    address: SocketTarget::new("0.0.0.0", 7000),
                    codec: Codec::Raw,
                    transport: Some(ImplementationId::EVENT_LOOP),
                    channel_capacity: 64,
                },
                EndpointConfig {
                    name: "upstream".to_string(),
                    kind: EndpointKind::TcpClient,
                    address: SocketTarget::new("10.0.0.1", 7000),
                    codec: Codec::Raw,
                    transport: Some(ImplementationId::MESSAGING),
                    channel_capacity: 8,
                },
            ]
        );

        let policy = config.reconnect_policy().unwrap();
        assert_eq!(policy.max_attempts(), Some(4));
        assert_eq!(policy.addresses().len(), 1);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        assert!(matches!(load("[defaults\nport = "), Err(ConfigError::ParseError(_))));
        assert!(matches!(
            load("[[endpoint]]\nname = \"x\"\nkind = \"quic-server\"\n"),
            Err(ConfigError::ParseError(_))
        ));
        assert!(matches!(
            load("[defaults]\ntransport = \"netty\"\n"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_validation_errors() {
        let duplicate = load(
            r#"
[[endpoint]]
name = "a"
kind = "tcp-server"

[[endpoint]]
name = "a"
kind = "tcp-client"
"#,
        );
        assert!(matches!(duplicate, Err(ConfigError::ValidationError(msg)) if msg.contains("duplicate")));

        let zero_delay = load("[reconnect]\ninitial_delay_ms = 0\n");
        assert!(matches!(zero_delay, Err(ConfigError::ValidationError(_))));

        let zero_capacity = load("[defaults]\nchannel_capacity = 0\n");
        assert!(matches!(zero_capacity, Err(ConfigError::ValidationError(_))));
    }

    // =========================================================================
    // Environment and CLI Override Tests
    // =========================================================================

    #[test]
    fn test_env_overrides_file() {
        let file = write_config(
            r#"
[defaults]
port = 7000

[[endpoint]]
name = "ingest"
kind = "tcp-server"
"#,
        );
        let env: HashMap<&str, &str> = [
            ("NETSTREAMS_BIND_ADDRESS", "0.0.0.0"),
            ("NETSTREAMS_PORT", "7100"),
            ("NETSTREAMS_TRANSPORT", "messaging"),
            ("NETSTREAMS_RECONNECT_ATTEMPTS", "3"),
        ]
        .into_iter()
        .collect();

        let config = load_config_with_env(Some(file.path().to_path_buf()), |key| {
            env.get(key).map(|v| v.to_string())
        })
        .unwrap();

        assert_eq!(config.source(), ConfigSource::Env);
        assert_eq!(config.port, 7100);
        assert_eq!(config.transport, Some(ImplementationId::MESSAGING));
        assert_eq!(config.reconnect.max_attempts, Some(3));
        assert_eq!(
            config.endpoint("ingest").unwrap().address,
            SocketTarget::new("0.0.0.0", 7100)
        );
    }

    #[test]
    fn test_bad_env_values() {
        let bad_port = load_config_with_env(None, |key| {
            (key == "NETSTREAMS_PORT").then(|| "seventy".to_string())
        });
        assert!(matches!(bad_port, Err(ConfigError::ValidationError(_))));

        let bad_transport = load_config_with_env(None, |key| {
            (key == "NETSTREAMS_TRANSPORT").then(|| "netty".to_string())
        });
        assert!(matches!(bad_transport, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_cli_overrides_rederive_endpoints() {
        let mut config = load(
            r#"
[[endpoint]]
name = "ingest"
kind = "tcp-server"

[[endpoint]]
name = "fixed"
kind = "tcp-server"
port = 9000
"#,
        )
        .unwrap();

        ConfigOverrides::new().with_port(4000).apply(&mut config);
        assert_eq!(config.source(), ConfigSource::Cli);
        assert_eq!(config.endpoint("ingest").unwrap().address.port(), 4000);
        assert_eq!(config.endpoint("fixed").unwrap().address.port(), 9000);
    }

    // =========================================================================
    // Spec Handout Tests
    // =========================================================================

    #[test]
    fn test_take_spec_once() {
        let config = load(
            r#"
[[endpoint]]
name = "upstream"
kind = "tcp-client"
port = 9100
"#,
        )
        .unwrap();
        let mut endpoints = config.endpoints();
        assert_eq!(endpoints.remaining(), vec!["upstream"]);

        let spec = endpoints.take_spec("upstream").unwrap();
        assert_eq!(spec.kind(), EndpointKind::TcpClient);
        assert!(endpoints.remaining().is_empty());

        match endpoints.take_spec("upstream") {
            Err(EndpointError::AlreadyBuilt { name }) => assert_eq!(name, "upstream"),
            other => panic!("Expected AlreadyBuilt, got: {other:?}"),
        }
        assert!(matches!(
            endpoints.take_spec("nowhere"),
            Err(EndpointError::Configuration(_))
        ));
    }

    #[cfg(feature = "event-loop")]
    #[test]
    fn test_taken_spec_builds() {
        let config = load(
            r#"
[[endpoint]]
name = "ingest"
kind = "tcp-server"
port = 0
codec = "framed"
transport = "event-loop"
"#,
        )
        .unwrap();

        let endpoint = config.endpoints().take_spec("ingest").unwrap().build().unwrap();
        assert_eq!(endpoint.implementation(), ImplementationId::EVENT_LOOP);
        assert_eq!(endpoint.address(), &SocketTarget::new("127.0.0.1", 0));
    }
}
