//! Error types for Tamanu core.

use crate::direction::SyncDirection;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in sync metadata operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage collaborator error, propagated unchanged.
    #[error("storage error: {0}")]
    Storage(#[from] tamanu_storage::StorageError),

    /// JSON column codec error.
    #[error("codec error: {0}")]
    Codec(#[from] tamanu_codec::CodecError),

    /// No schema is registered for the table.
    #[error("unknown entity type: {table}")]
    UnknownEntityType {
        /// The table name looked up.
        table: String,
    },

    /// The operation is not allowed for the type's sync direction.
    #[error("{operation} is not allowed on {table} ({direction})")]
    DirectionMismatch {
        /// The entity type.
        table: String,
        /// Its sync direction.
        direction: SyncDirection,
        /// The rejected operation.
        operation: &'static str,
    },

    /// A record or row could not be interpreted.
    #[error("invalid record in {table}: {message}")]
    InvalidRecord {
        /// The entity type.
        table: String,
        /// What was wrong with it.
        message: String,
    },

    /// A record expected to exist was not found.
    #[error("record not found: {id} in {table}")]
    RecordNotFound {
        /// The entity type.
        table: String,
        /// The missing id.
        id: String,
    },

    /// Invalid operation.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an unknown entity type error.
    pub fn unknown_entity_type(table: impl Into<String>) -> Self {
        Self::UnknownEntityType {
            table: table.into(),
        }
    }

    /// Creates an invalid record error.
    pub fn invalid_record(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}
