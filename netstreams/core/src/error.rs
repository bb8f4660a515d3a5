//! Endpoint Errors
//!
//! One error type covers the whole construction and lifecycle surface.
//! Capability absence is not represented here: an unresolved transport only
//! becomes [`EndpointError::NoTransportAvailable`] when a spec is built.

use thiserror::Error;

use crate::kind::EndpointKind;

/// Errors raised while building or operating an endpoint
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The spec or policy was left in an invalid state
    #[error("Invalid endpoint configuration: {0}")]
    Configuration(String),

    /// No transport implementation could be resolved for the kind
    #[error("No transport available for {kind}; link a transport feature or pass an explicit implementation")]
    NoTransportAvailable {
        /// The kind that was requested
        kind: EndpointKind,
    },

    /// The native handle is not of the requested type
    #[error("Underlying channel is not of the given type: expected {expected}, found {actual}")]
    TypeMismatch {
        /// Type the caller asked for
        expected: &'static str,
        /// Type actually held by the endpoint
        actual: &'static str,
    },

    /// A single-use spec was requested a second time
    #[error("Endpoint spec '{name}' has already been built")]
    AlreadyBuilt {
        /// Name of the configured endpoint
        name: String,
    },

    /// Operation not valid in the endpoint's current state or role
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Could not bind or connect to the target address
    #[error("Connection to {target} failed: {source}")]
    ConnectionFailed {
        /// Address that was attempted
        target: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The reconnect policy stopped before a connection succeeded
    #[error("Gave up after {attempts} connection attempt(s): {last_error}")]
    ReconnectExhausted {
        /// Number of attempts made
        attempts: u32,
        /// Error from the final attempt
        #[source]
        last_error: Box<EndpointError>,
    },

    /// Frame could not be encoded or decoded
    #[error("Frame error: {0}")]
    Frame(String),

    /// Frame checksum mismatch - data corruption detected
    #[error("Checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum carried in the frame header
        expected: u32,
        /// Checksum computed over the payload
        actual: u32,
    },

    /// IO error from the underlying socket
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EndpointError {
    /// Whether a reconnect loop should try again after this error
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. } | Self::Io(_))
    }
}

/// Result alias used across the crate
pub type Result<T, E = EndpointError> = std::result::Result<T, E>;
