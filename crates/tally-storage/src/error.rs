//! Error types for tally-storage
//!
//! Every redb failure collapses into [`StoreError::Unavailable`] with the
//! source message; callers branch on the variant, not on redb internals.

use tally_core::CoreError;
use thiserror::Error;

/// Errors that can occur in repository operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database could not be reached or an I/O operation failed
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The transaction could not be serialized; retry with the same input
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// Caller supplied out-of-range arguments
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A persisted record could not be decoded
    #[error("Corrupted record: {0}")]
    Corrupted(String),
}

impl StoreError {
    /// Create a new Unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Create a new ConcurrencyConflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::ConcurrencyConflict(message.into())
    }

    /// Create a new Corrupted error
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }

    /// Whether the same call may succeed if repeated
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::ConcurrencyConflict(_))
    }
}

impl From<CoreError> for StoreError {
    fn from(err: CoreError) -> Self {
        StoreError::InvalidArgument(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Convert from postcard Error to StoreError
impl From<postcard::Error> for StoreError {
    fn from(err: postcard::Error) -> Self {
        StoreError::Corrupted(err.to_string())
    }
}

impl From<redb::Error> for StoreError {
    fn from(err: redb::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl From<redb::DatabaseError> for StoreError {
    fn from(err: redb::DatabaseError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl From<redb::TransactionError> for StoreError {
    fn from(err: redb::TransactionError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl From<redb::TableError> for StoreError {
    fn from(err: redb::TableError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl From<redb::StorageError> for StoreError {
    fn from(err: redb::StorageError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl From<redb::CommitError> for StoreError {
    fn from(err: redb::CommitError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}
