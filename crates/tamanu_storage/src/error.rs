//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A row with the same id already exists.
    #[error("duplicate id {id} in table {table}")]
    DuplicateId {
        /// The table written to.
        table: String,
        /// The conflicting id.
        id: String,
    },

    /// A row was written without a text `id` column.
    #[error("row for table {table} has no text id")]
    MissingId {
        /// The table written to.
        table: String,
    },

    /// A dump or row could not be interpreted.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The store refused the operation (closed, disconnected, injected failure).
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Creates an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData(message.into())
    }

    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}
