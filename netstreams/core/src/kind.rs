//! Endpoint Kinds
//!
//! The closed set of endpoints the factory can build, and the role each one
//! plays.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Whether an endpoint listens or dials out
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Binds a local address and accepts peers
    Server,
    /// Connects to a remote address
    Client,
}

/// The kinds of endpoint the factory can build
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndpointKind {
    /// Stream server
    TcpServer,
    /// Stream client
    TcpClient,
    /// Datagram server
    UdpServer,
    /// HTTP server
    HttpServer,
    /// HTTP client
    HttpClient,
}

impl EndpointKind {
    /// Every kind, in declaration order
    pub const ALL: [EndpointKind; 5] = [
        EndpointKind::TcpServer,
        EndpointKind::TcpClient,
        EndpointKind::UdpServer,
        EndpointKind::HttpServer,
        EndpointKind::HttpClient,
    ];

    /// The role of this kind
    #[must_use]
    pub fn role(self) -> Role {
        match self {
            Self::TcpServer | Self::UdpServer | Self::HttpServer => Role::Server,
            Self::TcpClient | Self::HttpClient => Role::Client,
        }
    }

    /// Stable kebab-case name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TcpServer => "tcp-server",
            Self::TcpClient => "tcp-client",
            Self::UdpServer => "udp-server",
            Self::HttpServer => "http-server",
            Self::HttpClient => "http-client",
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndpointKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("unknown endpoint kind '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles() {
        assert_eq!(EndpointKind::TcpServer.role(), Role::Server);
        assert_eq!(EndpointKind::UdpServer.role(), Role::Server);
        assert_eq!(EndpointKind::HttpServer.role(), Role::Server);
        assert_eq!(EndpointKind::TcpClient.role(), Role::Client);
        assert_eq!(EndpointKind::HttpClient.role(), Role::Client);
    }

    #[test]
    fn test_parse_names() {
        for kind in EndpointKind::ALL {
            assert_eq!(kind.as_str().parse::<EndpointKind>(), Ok(kind));
        }
        assert_eq!("TCP_SERVER".parse(), Ok(EndpointKind::TcpServer));
        assert!("sctp-server".parse::<EndpointKind>().is_err());
    }
}
