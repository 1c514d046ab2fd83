//! Error types for the sync client.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Central answered with something the client cannot use.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Central rejected the request.
    #[error("server error: {0}")]
    ServerError(String),

    /// Local database error during sync.
    #[error("database error: {0}")]
    Database(#[from] tamanu_core::CoreError),

    /// Downloaded records that still failed after every import pass.
    #[error("{failed} records on channel {channel} could not be imported: {first_error}")]
    ImportFailed {
        /// The channel being downloaded.
        channel: String,
        /// How many records failed.
        failed: usize,
        /// The error of the first failed record.
        first_error: String,
    },

    /// A sync run was requested while another one is in progress.
    #[error("sync already in progress")]
    AlreadySyncing,

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// Not connected.
    #[error("not connected to central")]
    NotConnected,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            SyncError::ServerError(_) => true,
            _ => false,
        }
    }
}
