//! # Tamanu Storage
//!
//! The storage collaborator behind the Tamanu sync metadata layer.
//!
//! This crate provides the lowest-level data access abstraction. Stores are
//! **schema-agnostic row stores** - they evaluate filters and load named
//! relations but never interpret sync columns.
//!
//! ## Design Principles
//!
//! - Rows are `column -> Value` maps with a unique text `id`
//! - Each trait call is atomic; there is no cross-call transaction
//! - Must be `Send + Sync` for concurrent access
//! - Sync semantics live in `tamanu_core`
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing, tooling and ephemeral data
//!
//! ## Example
//!
//! ```rust
//! use tamanu_storage::{InMemoryStore, Query, RecordStore, Row};
//! use tamanu_codec::Value;
//!
//! let store = InMemoryStore::new();
//! let mut row = Row::new();
//! row.insert("id".into(), Value::from("E1"));
//! store.insert("encounters", row).unwrap();
//!
//! let rows = store.query(&Query::table("encounters").order_by_id()).unwrap();
//! assert_eq!(rows.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod memory;
mod query;

pub use backend::RecordStore;
pub use error::{StorageError, StorageResult};
pub use memory::InMemoryStore;
pub use query::{
    compare_values, row_id, values_equal, Criteria, Filter, FilterOp, Query, RelationKind,
    RelationSpec, Row, SortOrder, ID_COLUMN,
};
