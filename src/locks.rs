//! Per-resource-kind mutual exclusion.
//!
//! Atlas rejects or loses concurrent writes to some resource collections (two
//! custom roles created at once in one project can overwrite each other's
//! inherited roles). [`ResourceLocks`] hands out one async mutex per resource
//! kind. It lives in the provider context, so its scope is the configured
//! provider rather than the process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

/// Registry of one async mutex per resource kind.
///
/// Cloning is cheap and clones share the same locks.
#[derive(Debug, Clone, Default)]
pub struct ResourceLocks {
    locks: Arc<Mutex<HashMap<&'static str, Arc<AsyncMutex<()>>>>>,
}

impl ResourceLocks {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `kind`, waiting for any current holder.
    ///
    /// The lock is released when the guard is dropped.
    pub async fn lock(&self, kind: &'static str) -> OwnedMutexGuard<()> {
        let mutex = self.mutex(kind);
        trace!(kind, "Waiting for resource lock");
        let guard = mutex.lock_owned().await;
        trace!(kind, "Acquired resource lock");
        guard
    }

    /// Acquire the lock for `kind` if nobody holds it.
    pub fn try_lock(&self, kind: &'static str) -> Option<OwnedMutexGuard<()>> {
        self.mutex(kind).try_lock_owned().ok()
    }

    fn mutex(&self, kind: &'static str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(kind).or_default())
    }
}
