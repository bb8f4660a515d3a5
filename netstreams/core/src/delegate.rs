//! Delegate Access
//!
//! Escape hatch to the transport-native handle behind an [`Endpoint`], for
//! settings the common surface does not cover.
//!
//! ```ignore
//! let server: &StreamServer = delegate_as(&endpoint)?;
//! println!("accepted {}", server.accepted_connections());
//! ```

use std::any::Any;

use crate::endpoint::Endpoint;
use crate::error::{EndpointError, Result};

/// The native handle as `Any`
pub fn delegate(endpoint: &Endpoint) -> &dyn Any {
    endpoint.native().as_any()
}

/// The native handle as a concrete type
///
/// # Errors
///
/// Returns `EndpointError::TypeMismatch` if the handle is not a `T`.
pub fn delegate_as<T: Any>(endpoint: &Endpoint) -> Result<&T> {
    let native = endpoint.native();
    native
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| EndpointError::TypeMismatch {
            expected: std::any::type_name::<T>(),
            actual: native.type_name(),
        })
}

/// Mutable variant of [`delegate_as`]
///
/// # Errors
///
/// Returns `EndpointError::TypeMismatch` if the handle is not a `T`.
pub fn delegate_as_mut<T: Any>(endpoint: &mut Endpoint) -> Result<&mut T> {
    let native = endpoint.native_mut();
    let actual = native.type_name();
    native
        .as_any_mut()
        .downcast_mut::<T>()
        .ok_or(EndpointError::TypeMismatch {
            expected: std::any::type_name::<T>(),
            actual,
        })
}
