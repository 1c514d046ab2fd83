//! A store wrapper that records every call.
//!
//! Used to observe ordering of writes (for lock exclusivity) and to inject
//! write failures.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use tamanu_storage::{
    Criteria, InMemoryStore, Query, RecordStore, Row, StorageError, StorageResult,
};

/// Kind of store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    /// `find_one`
    FindOne,
    /// `insert`
    Insert,
    /// `update`
    Update,
    /// `delete`
    Delete,
    /// `query`
    Query,
}

impl StoreOp {
    /// Returns true for calls that modify rows.
    pub fn is_write(self) -> bool {
        matches!(self, StoreOp::Insert | StoreOp::Update | StoreOp::Delete)
    }
}

/// One recorded call with its position on a global logical clock.
#[derive(Debug, Clone)]
pub struct StoreCall {
    /// The call kind.
    pub op: StoreOp,
    /// The table touched.
    pub table: String,
    /// Clock value when the call started.
    pub started: u64,
    /// Clock value when the call returned.
    pub finished: u64,
    /// The partial row of an update.
    pub partial: Option<Row>,
}

/// An [`InMemoryStore`] that records calls, can slow writes down and can
/// be told to fail them.
#[derive(Debug, Default)]
pub struct RecordingStore {
    inner: InMemoryStore,
    clock: AtomicU64,
    calls: Mutex<Vec<StoreCall>>,
    write_delay: Mutex<Duration>,
    fail_writes: AtomicBool,
}

impl RecordingStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose writes each take at least `delay`.
    pub fn with_write_delay(delay: Duration) -> Self {
        let store = Self::new();
        *store.write_delay.lock() = delay;
        store
    }

    /// The wrapped store, for direct seeding and inspection.
    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    /// Makes every following write fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// All calls so far, in completion order.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }

    /// Write calls on `table`, ordered by start.
    pub fn writes(&self, table: &str) -> Vec<StoreCall> {
        let mut writes: Vec<_> = self
            .calls
            .lock()
            .iter()
            .filter(|c| c.op.is_write() && c.table == table)
            .cloned()
            .collect();
        writes.sort_by_key(|c| c.started);
        writes
    }

    /// Returns true if no two writes on `table` overlapped in time.
    pub fn writes_are_sequential(&self, table: &str) -> bool {
        self.writes(table)
            .windows(2)
            .all(|pair| pair[0].finished < pair[1].started)
    }

    /// Forgets recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst)
    }

    fn record<T>(
        &self,
        op: StoreOp,
        table: &str,
        partial: Option<&Row>,
        call: impl FnOnce() -> StorageResult<T>,
    ) -> StorageResult<T> {
        let started = self.tick();
        let result = if op.is_write() {
            if self.fail_writes.load(Ordering::SeqCst) {
                Err(StorageError::unavailable("injected write failure"))
            } else {
                let delay = *self.write_delay.lock();
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                call()
            }
        } else {
            call()
        };
        let finished = self.tick();
        self.calls.lock().push(StoreCall {
            op,
            table: table.to_string(),
            started,
            finished,
            partial: partial.cloned(),
        });
        result
    }
}

impl RecordStore for RecordingStore {
    fn find_one(&self, table: &str, id: &str) -> StorageResult<Option<Row>> {
        self.record(StoreOp::FindOne, table, None, || self.inner.find_one(table, id))
    }

    fn insert(&self, table: &str, row: Row) -> StorageResult<()> {
        self.record(StoreOp::Insert, table, None, || self.inner.insert(table, row))
    }

    fn update(&self, table: &str, criteria: &Criteria, partial: &Row) -> StorageResult<usize> {
        self.record(StoreOp::Update, table, Some(partial), || {
            self.inner.update(table, criteria, partial)
        })
    }

    fn delete(&self, table: &str, criteria: &Criteria) -> StorageResult<usize> {
        self.record(StoreOp::Delete, table, None, || self.inner.delete(table, criteria))
    }

    fn query(&self, query: &Query) -> StorageResult<Vec<Row>> {
        self.record(StoreOp::Query, &query.table, None, || self.inner.query(query))
    }
}
