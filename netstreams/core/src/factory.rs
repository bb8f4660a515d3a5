//! Endpoint Constructors
//!
//! Six constructors per endpoint kind, all returning a built [`Endpoint`]:
//!
//! | Shape | Example |
//! |-------|---------|
//! | defaults | `tcp_server()` |
//! | port | `tcp_server_on(9000)` |
//! | address | `tcp_server_at("0.0.0.0")` |
//! | address and port | `tcp_server_bound("0.0.0.0", 9000)` |
//! | callback | `tcp_server_with(\|spec\| spec.listen_port(9000).codec(Codec::Framed))` |
//! | explicit transport | `tcp_server_using(provider, \|spec\| spec.listen_port(9000))` |
//!
//! Server constructors set the listen address, client constructors the
//! connect address. The address shapes are shorthand for the callback
//! shape, so `tcp_client_bound(h, p)` and
//! `tcp_client_with(|s| s.connect(h, p))` build the same endpoint.

use std::sync::Arc;

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::kind::EndpointKind;
use crate::spec::EndpointSpec;
use crate::transport::TransportProvider;

/// Address used when none is given
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

/// Port used when none is given
pub const DEFAULT_PORT: u16 = 12012;

macro_rules! endpoint_constructors {
    (
        $kind:expr, $address:ident,
        $defaults:ident, $on:ident, $at:ident, $bound:ident, $with:ident, $using:ident
    ) => {
        #[doc = concat!("Build a `", stringify!($kind), "` on the default address and port")]
        ///
        /// # Errors
        ///
        /// Returns `EndpointError::NoTransportAvailable` if no transport is
        /// linked for this kind.
        pub fn $defaults() -> Result<Endpoint> {
            $bound(DEFAULT_BIND_ADDRESS, DEFAULT_PORT)
        }

        #[doc = concat!("Build a `", stringify!($kind), "` on the default address")]
        ///
        /// # Errors
        ///
        /// Returns `EndpointError::NoTransportAvailable` if no transport is
        /// linked for this kind.
        pub fn $on(port: u16) -> Result<Endpoint> {
            $bound(DEFAULT_BIND_ADDRESS, port)
        }

        #[doc = concat!("Build a `", stringify!($kind), "` on the default port")]
        ///
        /// # Errors
        ///
        /// Returns `EndpointError::NoTransportAvailable` if no transport is
        /// linked for this kind.
        pub fn $at(address: impl Into<String>) -> Result<Endpoint> {
            $bound(address, DEFAULT_PORT)
        }

        #[doc = concat!("Build a `", stringify!($kind), "` on an explicit address and port")]
        ///
        /// # Errors
        ///
        /// Returns `EndpointError::NoTransportAvailable` if no transport is
        /// linked for this kind.
        pub fn $bound(address: impl Into<String>, port: u16) -> Result<Endpoint> {
            let address = address.into();
            $with(move |spec| spec.$address(address, port))
        }

        #[doc = concat!("Build a `", stringify!($kind), "` from a configuration callback")]
        ///
        /// # Errors
        ///
        /// Returns `EndpointError::Configuration` if the callback leaves the
        /// spec invalid, or `EndpointError::NoTransportAvailable` if no
        /// transport is linked for this kind.
        pub fn $with<F>(configure: F) -> Result<Endpoint>
        where
            F: FnOnce(EndpointSpec) -> EndpointSpec,
        {
            EndpointSpec::new($kind).configure(configure).build()
        }

        #[doc = concat!("Build a `", stringify!($kind), "` on an explicit transport, bypassing the registry")]
        ///
        /// # Errors
        ///
        /// Returns `EndpointError::Configuration` if the callback leaves the
        /// spec invalid, or `EndpointError::NoTransportAvailable` if the
        /// provider does not support this kind.
        pub fn $using<F>(provider: Arc<dyn TransportProvider>, configure: F) -> Result<Endpoint>
        where
            F: FnOnce(EndpointSpec) -> EndpointSpec,
        {
            EndpointSpec::new($kind)
                .implementation(provider)
                .configure(configure)
                .build()
        }
    };
}

endpoint_constructors!(
    EndpointKind::TcpServer, listen,
    tcp_server, tcp_server_on, tcp_server_at, tcp_server_bound, tcp_server_with, tcp_server_using
);

endpoint_constructors!(
    EndpointKind::TcpClient, connect,
    tcp_client, tcp_client_on, tcp_client_at, tcp_client_bound, tcp_client_with, tcp_client_using
);

endpoint_constructors!(
    EndpointKind::UdpServer, listen,
    udp_server, udp_server_on, udp_server_at, udp_server_bound, udp_server_with, udp_server_using
);

endpoint_constructors!(
    EndpointKind::HttpServer, listen,
    http_server, http_server_on, http_server_at, http_server_bound, http_server_with, http_server_using
);

endpoint_constructors!(
    EndpointKind::HttpClient, connect,
    http_client, http_client_on, http_client_at, http_client_bound, http_client_with, http_client_using
);
