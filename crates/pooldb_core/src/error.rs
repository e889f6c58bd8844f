//! Error types for record store operations.

use pooldb_driver::StorageError;
use pooldb_schema::{SchemaError, ValidationError};
use std::io;
use thiserror::Error;

/// Result type for record store operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors raised by the record store and everything above the driver.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The declared schema does not match its use.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A value could not be coerced to its field's datatype.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The database driver failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// No entry exists under the id.
    #[error("entry {id} not found")]
    NotFound {
        /// The id that was looked up.
        id: i64,
    },

    /// The entry has no file stored under the key.
    #[error("entry {id} has no file '{key}'")]
    FileNotFound {
        /// The owning entry id.
        id: i64,
        /// The file key that was looked up.
        key: String,
    },

    /// The pool was opened without a file store root.
    #[error("pool has no file store configured")]
    FilesDisabled,

    /// An I/O error occurred in the file store.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl PoolError {
    /// Creates a [`PoolError::NotFound`].
    #[must_use]
    pub fn not_found(id: i64) -> Self {
        Self::NotFound { id }
    }

    /// Creates a [`PoolError::FileNotFound`].
    pub fn file_not_found(id: i64, key: impl Into<String>) -> Self {
        Self::FileNotFound {
            id,
            key: key.into(),
        }
    }

    /// Returns whether retrying the failed operation may succeed without
    /// intervention. Only transient driver failures qualify.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Storage(err) if err.retryable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_layer_errors_transparently() {
        let err = PoolError::from(SchemaError::unknown_table("articles"));
        assert_eq!(err.to_string(), "unknown table 'articles'");

        let err = PoolError::from(StorageError::busy("locked"));
        assert!(err.retryable());

        let err = PoolError::not_found(42);
        assert_eq!(err.to_string(), "entry 42 not found");
        assert!(!err.retryable());
    }
}
