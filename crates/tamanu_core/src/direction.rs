//! Per-type sync direction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which way records of an entity type travel between device and central.
///
/// The direction is static per type; there are no runtime transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncDirection {
    /// Device-local only.
    DoNotSync,
    /// Created on the device, uploaded, never downloaded.
    PushToCentral,
    /// Authored centrally, downloaded, never uploaded.
    PullFromCentral,
    /// Travels both ways; changes are tracked per field.
    Bidirectional,
}

impl SyncDirection {
    /// All directions, in declaration order.
    pub const ALL: [SyncDirection; 4] = [
        SyncDirection::DoNotSync,
        SyncDirection::PushToCentral,
        SyncDirection::PullFromCentral,
        SyncDirection::Bidirectional,
    ];

    /// The serialized name.
    pub const fn as_str(self) -> &'static str {
        match self {
            SyncDirection::DoNotSync => "DO_NOT_SYNC",
            SyncDirection::PushToCentral => "PUSH_TO_CENTRAL",
            SyncDirection::PullFromCentral => "PULL_FROM_CENTRAL",
            SyncDirection::Bidirectional => "BIDIRECTIONAL",
        }
    }

    /// Returns true if records of this type are uploaded.
    pub const fn pushes(self) -> bool {
        matches!(
            self,
            SyncDirection::PushToCentral | SyncDirection::Bidirectional
        )
    }

    /// Returns true if records of this type are downloaded.
    pub const fn pulls(self) -> bool {
        matches!(
            self,
            SyncDirection::PullFromCentral | SyncDirection::Bidirectional
        )
    }

    /// Returns true if the type keeps per-field change ticks.
    pub const fn tracks_field_changes(self) -> bool {
        matches!(self, SyncDirection::Bidirectional)
    }

    /// Returns true if a type with this direction takes part in a sync
    /// running in `requested` direction.
    ///
    /// Push and pull requests include bidirectional types. `DoNotSync`
    /// and `Bidirectional` requests select exactly their own types.
    pub const fn participates_in(self, requested: SyncDirection) -> bool {
        match requested {
            SyncDirection::PushToCentral => self.pushes(),
            SyncDirection::PullFromCentral => self.pulls(),
            SyncDirection::DoNotSync => matches!(self, SyncDirection::DoNotSync),
            SyncDirection::Bidirectional => matches!(self, SyncDirection::Bidirectional),
        }
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SyncDirection::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| format!("unknown sync direction: {s}"))
    }
}
