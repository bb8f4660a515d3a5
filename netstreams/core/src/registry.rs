//! Transport Registry
//!
//! Decides, once per process, which transport backs each endpoint kind when
//! a spec does not name one.
//!
//! # Resolution
//!
//! 1. Event-loop transport present: every kind resolves to it.
//! 2. Otherwise, messaging transport present: `TcpServer` and `TcpClient`
//!    resolve to it; the rest stay unresolved.
//! 3. Otherwise nothing resolves.
//!
//! "Present" is answered by a [`CapabilityProbe`]. The process-wide registry
//! uses [`LinkedCapabilities`], which reports the cargo features compiled
//! into this build. A missing capability is a normal outcome; it only turns
//! into an error when a spec for an unresolved kind is built.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::kind::EndpointKind;
use crate::transport::{builtin_provider, TransportProvider};

static GLOBAL: OnceLock<TransportRegistry> = OnceLock::new();

/// Name of a transport implementation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImplementationId(&'static str);

impl ImplementationId {
    /// Full-featured tokio transport
    pub const EVENT_LOOP: Self = Self("event-loop");

    /// Lightweight framed messaging sockets
    pub const MESSAGING: Self = Self("messaging");

    /// Name a custom implementation
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Look up a built-in implementation by name
    #[must_use]
    pub fn builtin(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "event-loop" | "eventloop" | "tokio" => Some(Self::EVENT_LOOP),
            "messaging" | "message" => Some(Self::MESSAGING),
            _ => None,
        }
    }

    /// The implementation name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ImplementationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Serialize for ImplementationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

impl<'de> Deserialize<'de> for ImplementationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Self::builtin(&name).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "unknown transport '{name}' (expected 'event-loop' or 'messaging')"
            ))
        })
    }
}

/// Answers whether a transport library is available in this process
///
/// Implementations must not fail; absence is reported as `false`.
pub trait CapabilityProbe {
    /// Whether the library is loadable
    fn is_available(&self, library: &str) -> bool;
}

impl<F> CapabilityProbe for F
where
    F: Fn(&str) -> bool,
{
    fn is_available(&self, library: &str) -> bool {
        self(library)
    }
}

/// Probe backed by the cargo features compiled into this build
#[derive(Clone, Copy, Debug, Default)]
pub struct LinkedCapabilities;

impl CapabilityProbe for LinkedCapabilities {
    fn is_available(&self, library: &str) -> bool {
        match library {
            "event-loop" => cfg!(feature = "event-loop"),
            "messaging" => cfg!(feature = "messaging"),
            _ => false,
        }
    }
}

/// Default implementation per endpoint kind
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportRegistry {
    defaults: HashMap<EndpointKind, Option<ImplementationId>>,
}

impl TransportRegistry {
    /// Resolve defaults against a probe
    pub fn resolve(probe: &dyn CapabilityProbe) -> Self {
        let mut defaults: HashMap<EndpointKind, Option<ImplementationId>> =
            EndpointKind::ALL.into_iter().map(|kind| (kind, None)).collect();

        if probe.is_available(ImplementationId::EVENT_LOOP.as_str()) {
            for slot in defaults.values_mut() {
                *slot = Some(ImplementationId::EVENT_LOOP);
            }
        } else if probe.is_available(ImplementationId::MESSAGING.as_str()) {
            defaults.insert(EndpointKind::TcpServer, Some(ImplementationId::MESSAGING));
            defaults.insert(EndpointKind::TcpClient, Some(ImplementationId::MESSAGING));
        }

        Self { defaults }
    }

    /// The process-wide registry, resolved on first use
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(|| {
            let registry = Self::resolve(&LinkedCapabilities);
            for line in registry.describe() {
                tracing::debug!(target: "netstreams_core::registry", "{line}");
            }
            registry
        })
    }

    /// Default implementation for a kind, if any
    pub fn default_implementation(&self, kind: EndpointKind) -> Option<ImplementationId> {
        self.defaults.get(&kind).copied().flatten()
    }

    /// Linked provider behind the default implementation
    pub fn default_provider(&self, kind: EndpointKind) -> Option<Arc<dyn TransportProvider>> {
        self.default_implementation(kind).and_then(builtin_provider)
    }

    /// Kinds with no default implementation
    pub fn unresolved(&self) -> Vec<EndpointKind> {
        EndpointKind::ALL
            .into_iter()
            .filter(|kind| self.default_implementation(*kind).is_none())
            .collect()
    }

    /// One human-readable line per kind
    pub fn describe(&self) -> Vec<String> {
        EndpointKind::ALL
            .into_iter()
            .map(|kind| match self.default_implementation(kind) {
                Some(id) => format!("{kind} -> {id}"),
                None => format!("{kind} -> unresolved"),
            })
            .collect()
    }
}

/// Default implementation for a kind from the process-wide registry
pub fn default_implementation(kind: EndpointKind) -> Option<ImplementationId> {
    TransportRegistry::global().default_implementation(kind)
}
