//! Storage collaborator trait definition.

use crate::error::StorageResult;
use crate::query::{Criteria, Query, Row};

/// The data-access interface the sync metadata layer expects.
///
/// Stores are **schema-agnostic row stores**: they keep rows per table and
/// evaluate criteria, but know nothing about sync directions, upload flags
/// or field ticks. Those belong to `tamanu_core`.
///
/// # Invariants
///
/// - Every row has a unique text `id` within its table
/// - `update` applies its partial row to all matching rows atomically per call
/// - `query` with [`SortOrder::IdAscending`](crate::SortOrder) returns rows in
///   strictly increasing id order
/// - Stores must be `Send + Sync`; callers share them across threads
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For tests, tooling and ephemeral databases
pub trait RecordStore: Send + Sync {
    /// Reads the row with the given id, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn find_one(&self, table: &str, id: &str) -> StorageResult<Option<Row>>;

    /// Inserts a new row.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The row has no text id
    /// - A row with the same id already exists
    fn insert(&self, table: &str, row: Row) -> StorageResult<()>;

    /// Merges `partial` into every row matching `criteria`.
    ///
    /// Returns the number of rows changed. The `id` column is never rewritten.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn update(&self, table: &str, criteria: &Criteria, partial: &Row) -> StorageResult<usize>;

    /// Deletes every row matching `criteria`, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn delete(&self, table: &str, criteria: &Criteria) -> StorageResult<usize>;

    /// Runs a read query.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn query(&self, query: &Query) -> StorageResult<Vec<Row>>;

    /// Counts rows matching `criteria`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn count(&self, table: &str, criteria: &Criteria) -> StorageResult<usize> {
        let query = Query::table(table).criteria(criteria.clone());
        Ok(self.query(&query)?.len())
    }
}
