//! Endpoints
//!
//! An [`Endpoint`] pairs an immutable identity (kind, address, transport,
//! environment) with the native handle the transport created for it.
//! Servers are driven with [`Endpoint::start`] and [`Endpoint::stop`],
//! clients with [`Endpoint::connect`] and [`Endpoint::disconnect`].

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::environment::Environment;
use crate::error::{EndpointError, Result};
use crate::kind::{EndpointKind, Role};
use crate::reconnect::{Reconnect, ReconnectPolicy, ReconnectState};
use crate::registry::ImplementationId;
use crate::spec::SocketTarget;
use crate::transport::{Channel, NativeEndpoint};

/// A built, transport-backed endpoint
pub struct Endpoint {
    kind: EndpointKind,
    address: SocketTarget,
    implementation: ImplementationId,
    environment: Option<Arc<Environment>>,
    native: Box<dyn NativeEndpoint>,
}

impl Endpoint {
    pub(crate) fn new(
        kind: EndpointKind,
        address: SocketTarget,
        implementation: ImplementationId,
        environment: Option<Arc<Environment>>,
        native: Box<dyn NativeEndpoint>,
    ) -> Self {
        Self {
            kind,
            address,
            implementation,
            environment,
            native,
        }
    }

    /// Kind this endpoint was built as
    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    /// Server or client
    pub fn role(&self) -> Role {
        self.kind.role()
    }

    /// Listen address for servers, target address for clients
    pub fn address(&self) -> &SocketTarget {
        &self.address
    }

    /// Transport that created the native handle
    pub fn implementation(&self) -> ImplementationId {
        self.implementation
    }

    /// Environment attached at build time, if any
    pub fn environment(&self) -> Option<&Arc<Environment>> {
        self.environment.as_ref()
    }

    /// Bind and begin accepting connections
    ///
    /// # Errors
    ///
    /// Returns `EndpointError::InvalidState` on a client endpoint or if
    /// already listening, and `EndpointError::ConnectionFailed` if the bind
    /// fails.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        self.require(Role::Server, "start")?;
        self.native.start(&self.address).await
    }

    /// Stop accepting and close every accepted connection
    ///
    /// # Errors
    ///
    /// Returns `EndpointError::InvalidState` on a client endpoint.
    pub async fn stop(&mut self) -> Result<()> {
        self.require(Role::Server, "stop")?;
        self.native.close().await
    }

    /// Dial the configured address once
    ///
    /// # Errors
    ///
    /// Returns `EndpointError::InvalidState` on a server endpoint or if
    /// already connected, and `EndpointError::ConnectionFailed` if the dial
    /// fails.
    pub async fn connect(&mut self) -> Result<Channel> {
        self.require(Role::Client, "connect")?;
        self.native.connect(&self.address).await
    }

    /// Dial until connected or the policy gives up
    ///
    /// Any existing connection is closed first. Each failed attempt waits the
    /// delay the policy returns; when the policy carries failover addresses,
    /// attempts rotate through them starting from the configured address.
    ///
    /// # Errors
    ///
    /// Returns `EndpointError::ReconnectExhausted` when the policy stops, and
    /// the attempt's own error at once if it is not retryable.
    pub async fn connect_with(&mut self, policy: &ReconnectPolicy) -> Result<Channel> {
        self.require(Role::Client, "connect")?;
        if self.native.is_open() {
            self.native.close().await?;
        }

        let mut state = ReconnectState::new(policy);
        loop {
            let target = policy.next_address(state.attempt(), &self.address);
            let error = match self.native.connect(&target).await {
                Ok(channel) => {
                    if state.attempt() > 0 {
                        tracing::info!(
                            kind = %self.kind,
                            %target,
                            attempts = state.attempt() + 1,
                            "Reconnected"
                        );
                    }
                    state.on_success();
                    return Ok(channel);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            let attempts = state.attempt() + 1;
            match state.on_failure() {
                Reconnect::Delay(delay) => {
                    tracing::warn!(
                        kind = %self.kind,
                        %target,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Connect failed, retrying"
                    );
                    // Reconnect backoff between attempts
                    tokio::time::sleep(delay).await;
                }
                Reconnect::Stop => {
                    tracing::error!(kind = %self.kind, %target, attempts, error = %error, "Giving up");
                    return Err(EndpointError::ReconnectExhausted {
                        attempts,
                        last_error: Box::new(error),
                    });
                }
            }
        }
    }

    /// Close the current connection
    ///
    /// # Errors
    ///
    /// Returns `EndpointError::InvalidState` on a server endpoint.
    pub async fn disconnect(&mut self) -> Result<()> {
        self.require(Role::Client, "disconnect")?;
        self.native.close().await
    }

    /// Whether the socket is bound or connected
    pub fn is_open(&self) -> bool {
        self.native.is_open()
    }

    /// Local socket address once open
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.native.local_addr()
    }

    pub(crate) fn native(&self) -> &dyn NativeEndpoint {
        self.native.as_ref()
    }

    pub(crate) fn native_mut(&mut self) -> &mut dyn NativeEndpoint {
        self.native.as_mut()
    }

    fn require(&self, role: Role, operation: &str) -> Result<()> {
        if self.kind.role() == role {
            Ok(())
        } else {
            Err(EndpointError::InvalidState(format!(
                "cannot {operation} a {} endpoint",
                self.kind
            )))
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("kind", &self.kind)
            .field("address", &self.address)
            .field("implementation", &self.implementation)
            .field("environment", &self.environment.as_ref().map(|e| e.name().to_string()))
            .field("native", &self.native.type_name())
            .field("open", &self.native.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;

    use async_trait::async_trait;

    use super::*;

    /// Native handle that refuses every dial
    struct Unreachable {
        dials: Vec<SocketTarget>,
        open: bool,
    }

    #[async_trait]
    impl NativeEndpoint for Unreachable {
        async fn connect(&mut self, target: &SocketTarget) -> Result<Channel> {
            self.dials.push(target.clone());
            Err(EndpointError::ConnectionFailed {
                target: target.to_string(),
                source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            })
        }

        async fn close(&mut self) -> Result<()> {
            self.open = false;
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn local_addr(&self) -> Option<SocketAddr> {
            None
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn endpoint(kind: EndpointKind) -> Endpoint {
        Endpoint::new(
            kind,
            SocketTarget::new("127.0.0.1", 1),
            ImplementationId::new("unreachable"),
            None,
            Box::new(Unreachable {
                dials: Vec::new(),
                open: false,
            }),
        )
    }

    #[tokio::test]
    async fn test_role_mismatch_is_invalid_state() {
        let mut client = endpoint(EndpointKind::TcpClient);
        assert!(matches!(client.start().await, Err(EndpointError::InvalidState(_))));
        assert!(matches!(client.stop().await, Err(EndpointError::InvalidState(_))));

        let mut server = endpoint(EndpointKind::UdpServer);
        assert!(matches!(server.connect().await, Err(EndpointError::InvalidState(_))));
        assert!(matches!(server.disconnect().await, Err(EndpointError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_default_start_rejected_by_client_handle() {
        let mut server = endpoint(EndpointKind::TcpServer);
        match server.start().await {
            Err(EndpointError::InvalidState(msg)) => assert!(msg.contains("cannot listen")),
            other => panic!("Expected InvalidState, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connect_with_exhausts_and_rotates() {
        let policy = crate::reconnect::backoff_reconnect()
            .initial_delay(std::time::Duration::from_millis(1))
            .max_attempts(3)
            .address(SocketTarget::new("127.0.0.1", 2))
            .build()
            .unwrap();

        let mut client = endpoint(EndpointKind::TcpClient);
        match client.connect_with(&policy).await {
            Err(EndpointError::ReconnectExhausted { attempts, last_error }) => {
                assert_eq!(attempts, 4);
                assert!(matches!(*last_error, EndpointError::ConnectionFailed { .. }));
            }
            other => panic!("Expected ReconnectExhausted, got: {other:?}"),
        }

        let native = client.native().as_any().downcast_ref::<Unreachable>().unwrap();
        let ports: Vec<u16> = native.dials.iter().map(SocketTarget::port).collect();
        assert_eq!(ports, vec![1, 2, 1, 2]);
    }

    #[test]
    fn test_debug_names_native_type() {
        let rendered = format!("{:?}", endpoint(EndpointKind::TcpClient));
        assert!(rendered.contains("Unreachable"));
        assert!(rendered.contains("TcpClient"));
    }
}
