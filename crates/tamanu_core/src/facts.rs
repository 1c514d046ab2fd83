//! Device-local key/value facts.
//!
//! Facts live in the `local_system_facts` table, which never syncs. They
//! hold the current sync tick, per-channel pull cursors and the ticks of
//! the last successful push and pull.

use crate::error::CoreResult;
use crate::record::columns;
use crate::types::{timestamp_to_value, SyncTick};
use chrono::Utc;
use std::sync::Arc;
use tamanu_codec::Value;
use tamanu_storage::{Criteria, RecordStore, Row};
use tracing::{debug, warn};

/// Table holding the facts.
pub const FACTS_TABLE: &str = "local_system_facts";

/// Fact holding the tick new field changes are stamped with.
pub const CURRENT_SYNC_TICK: &str = "currentSyncTick";
/// Fact holding the tick of the last completed push.
pub const LAST_SUCCESSFUL_PUSH: &str = "lastSuccessfulSyncPush";
/// Fact holding the tick of the last completed pull.
pub const LAST_SUCCESSFUL_PULL: &str = "lastSuccessfulSyncPull";

const PULL_CURSOR_PREFIX: &str = "pullCursor.";

/// Returns the fact key of the pull cursor for `channel`.
pub fn pull_cursor_key(channel: &str) -> String {
    format!("{PULL_CURSOR_PREFIX}{channel}")
}

/// Access to the facts table.
///
/// Keys double as row ids, so each key is stored at most once.
#[derive(Clone)]
pub struct LocalSystemFacts {
    store: Arc<dyn RecordStore>,
}

impl LocalSystemFacts {
    /// Creates a facts accessor over `store`.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Reads a fact.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn get(&self, key: &str) -> CoreResult<Option<String>> {
        let row = self.store.find_one(FACTS_TABLE, key)?;
        Ok(row
            .and_then(|row| row.get("value").cloned())
            .and_then(|value| match value {
                Value::Text(text) => Some(text),
                Value::Null => None,
                other => Some(serde_json::Value::from(other).to_string()),
            }))
    }

    /// Writes a fact, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn set(&self, key: &str, value: &str) -> CoreResult<()> {
        let now = timestamp_to_value(Utc::now());
        let mut partial = Row::new();
        partial.insert("value".into(), Value::from(value));
        partial.insert(columns::UPDATED_AT.into(), now.clone());

        let changed = self
            .store
            .update(FACTS_TABLE, &Criteria::by_id(key), &partial)?;
        if changed == 0 {
            let mut row = partial;
            row.insert(columns::ID.into(), Value::from(key));
            row.insert("key".into(), Value::from(key));
            row.insert(columns::CREATED_AT.into(), now);
            self.store.insert(FACTS_TABLE, row)?;
        }
        debug!(key, value, "local fact written");
        Ok(())
    }

    /// Reads the pull cursor of `channel`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn pull_cursor(&self, channel: &str) -> CoreResult<Option<String>> {
        self.get(&pull_cursor_key(channel))
    }

    /// Stores the pull cursor of `channel`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn set_pull_cursor(&self, channel: &str, cursor: &str) -> CoreResult<()> {
        self.set(&pull_cursor_key(channel), cursor)
    }

    /// Reads a tick-valued fact. Missing or unreadable values read as zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn tick(&self, key: &str) -> CoreResult<SyncTick> {
        let Some(text) = self.get(key)? else {
            return Ok(SyncTick::ZERO);
        };
        match text.trim().parse::<u64>() {
            Ok(tick) => Ok(SyncTick(tick)),
            Err(_) => {
                warn!(key, value = %text, "unreadable tick fact, using 0");
                Ok(SyncTick::ZERO)
            }
        }
    }

    /// Writes a tick-valued fact.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn set_tick(&self, key: &str, tick: SyncTick) -> CoreResult<()> {
        self.set(key, &tick.to_string())
    }
}

/// The current sync tick, as used for field change stamps.
#[derive(Clone)]
pub struct SyncTicks {
    facts: LocalSystemFacts,
}

impl SyncTicks {
    /// Creates a tick accessor.
    pub fn new(facts: LocalSystemFacts) -> Self {
        Self { facts }
    }

    /// Reads the current tick.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn current(&self) -> CoreResult<SyncTick> {
        self.facts.tick(CURRENT_SYNC_TICK)
    }

    /// Replaces the current tick, typically with the tick central started
    /// the latest session at.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn set_current(&self, tick: SyncTick) -> CoreResult<()> {
        self.facts.set_tick(CURRENT_SYNC_TICK, tick)
    }

    /// Moves the current tick forward by one and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    pub fn advance(&self) -> CoreResult<SyncTick> {
        let next = self.current()?.next();
        self.set_current(next)?;
        Ok(next)
    }
}
