//! Core type definitions.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tamanu_codec::Value;

/// System-managed timestamp.
pub type Timestamp = DateTime<Utc>;

/// A logical clock value issued by the sync protocol.
///
/// Field ticks record the tick at which each field last changed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SyncTick(pub u64);

impl SyncTick {
    /// The tick before any sync has happened.
    pub const ZERO: SyncTick = SyncTick(0);

    /// Creates a tick.
    #[inline]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the following tick.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SyncTick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SyncTick {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Encodes a timestamp as the text stored in timestamp columns.
pub fn timestamp_to_value(ts: Timestamp) -> Value {
    Value::Text(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Reads a timestamp column. Null, non-text and unparseable values read as `None`.
pub fn timestamp_from_value(value: &Value) -> Option<Timestamp> {
    let text = value.as_text()?;
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
