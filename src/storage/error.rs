//! Storage-specific error types.
//!
//! All storage operations return [`StorageError`] on failure. The collector
//! treats every variant as non-fatal for a single cycle; the query API maps
//! read failures to an explicit unavailable response.

use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Appending a sample failed (I/O, constraint, busy timeout).
    #[error("write failed: {0}")]
    WriteFailed(#[source] sqlx::Error),

    /// Reading from the store failed.
    #[error("read failed: {0}")]
    ReadFailed(#[source] sqlx::Error),

    /// Opening the database or ensuring the schema failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The writer actor is gone or did not answer in time.
    #[error("failed to send command to writer actor")]
    ChannelSend,

    /// Internal error (e.g., task join failure).
    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    pub(crate) fn read(e: sqlx::Error) -> Self {
        Self::ReadFailed(e)
    }

    pub(crate) fn write(e: sqlx::Error) -> Self {
        Self::WriteFailed(e)
    }
}
