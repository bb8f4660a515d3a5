//! Shared Execution Environment
//!
//! A process-wide handle to the runtime that endpoint tasks run on. When an
//! environment is active, every spec built without an explicit one picks it
//! up automatically.
//!
//! ```ignore
//! let env = Environment::initialize("netstreams", tokio::runtime::Handle::current());
//! let server = netstreams_core::tcp_server()?; // env injected
//! Environment::terminate();
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

static CURRENT: RwLock<Option<Arc<Environment>>> = parking_lot::const_rwlock(None);

/// Runtime handle shared by all endpoints of a process
pub struct Environment {
    name: String,
    runtime: Handle,
    started_at: Instant,
}

impl Environment {
    /// Create an environment without publishing it process-wide
    #[must_use]
    pub fn new(name: impl Into<String>, runtime: Handle) -> Self {
        Self {
            name: name.into(),
            runtime,
            started_at: Instant::now(),
        }
    }

    /// Publish a new process-wide environment, replacing any previous one
    pub fn initialize(name: impl Into<String>, runtime: Handle) -> Arc<Self> {
        let env = Arc::new(Self::new(name, runtime));
        let previous = CURRENT.write().replace(Arc::clone(&env));
        if let Some(previous) = previous {
            tracing::warn!(previous = %previous.name, current = %env.name, "Replacing active environment");
        } else {
            tracing::debug!(name = %env.name, "Environment initialized");
        }
        env
    }

    /// Whether a process-wide environment is active
    pub fn is_active() -> bool {
        CURRENT.read().is_some()
    }

    /// The active process-wide environment
    pub fn current() -> Option<Arc<Self>> {
        CURRENT.read().clone()
    }

    /// Withdraw the process-wide environment
    ///
    /// Endpoints already built keep their own reference.
    pub fn terminate() -> Option<Arc<Self>> {
        let previous = CURRENT.write().take();
        if let Some(ref env) = previous {
            tracing::debug!(name = %env.name, "Environment terminated");
        }
        previous
    }

    /// Environment name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// When the environment was created
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Spawn a task on this environment's runtime
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime.spawn(future)
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("name", &self.name)
            .field("uptime", &self.started_at.elapsed())
            .finish_non_exhaustive()
    }
}

/// Spawn on the given environment, or on the ambient runtime when there is none
pub(crate) fn spawn_on<F>(env: Option<&Arc<Environment>>, future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match env {
        Some(env) => env.spawn(future),
        None => tokio::spawn(future),
    }
}
