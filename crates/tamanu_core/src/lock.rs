//! Per-entity-type exclusive locks.
//!
//! One mutex per type, not per row. Flag writes for a type hold it so they
//! never interleave; nothing else is ordered by it.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Registry of per-type mutexes, created on first use.
#[derive(Debug, Default)]
pub struct TypeLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TypeLocks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the mutex guarding `table`.
    ///
    /// Every call for the same table returns the same mutex.
    pub fn lock_for(&self, table: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(table.to_string()).or_default())
    }

    /// Runs `f` while holding the lock of `table`.
    ///
    /// The guard is dropped on every exit path, including errors returned
    /// from `f` and panics.
    pub fn run_exclusive<T>(&self, table: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(table);
        let _guard = lock.lock();
        trace!(table, "type lock acquired");
        f()
    }

    /// Returns true if some thread currently holds the lock of `table`.
    pub fn is_locked(&self, table: &str) -> bool {
        self.locks
            .lock()
            .get(table)
            .is_some_and(|lock| lock.is_locked())
    }
}
