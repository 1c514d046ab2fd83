//! # Tamanu Core
//!
//! The sync metadata layer every persisted Tamanu entity participates in.
//!
//! This crate provides:
//! - The upload-marking contract (`markedForUpload`, `uploadedAt`) with a
//!   per-type exclusive lock around flag writes
//! - Static per-type sync directions
//! - The keyset-paginated upload-candidate query
//! - Field-level "last changed" ticks for bidirectional types
//! - Export plans, local system facts and the entity catalog
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │              SyncDatabase              │
//! │  (schemas, type locks, local facts)    │
//! ├────────────────────────────────────────┤
//! │                 Model                  │
//! │  (upload flags, field ticks, import)   │
//! ├────────────────────────────────────────┤
//! │         RecordStore (storage)          │
//! └────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//!
//! - `markedForUpload` becomes false only through `mark_uploaded` (or a
//!   pull-merge write), which also stamps `uploadedAt`
//! - Flag writes for one type never interleave
//! - Upload pages are strictly ascending by id and resume with `id > after`
//! - A save that changes nothing leaves `updatedAtByField` byte-identical

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod catalog;
mod channel;
mod config;
mod database;
mod direction;
mod error;
mod export;
pub mod facts;
mod field_ticks;
mod lock;
mod model;
mod record;
mod schema;
mod types;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use channel::Channel;
pub use config::{Config, DEFAULT_UPLOAD_LIMIT};
pub use database::SyncDatabase;
pub use direction::SyncDirection;
pub use error::{CoreError, CoreResult};
pub use export::{ExportPlan, SyncRecord};
pub use facts::{LocalSystemFacts, SyncTicks};
pub use field_ticks::{
    compute_updated_at_by_field, parse_field_ticks, resolved_column_value, FieldTicks,
};
pub use lock::TypeLocks;
pub use model::{ImportOutcome, Model, ParentRef, UploadQuery};
pub use record::{columns, RecordId, SyncableRecord};
pub use schema::{models_for_direction, EntitySchema, SchemaRegistry, RELATION_ID_SUFFIX};
pub use types::{timestamp_from_value, timestamp_to_value, SyncTick, Timestamp};
