//! Error types for driver operations.

use std::io;
use thiserror::Error;

/// Result type for driver operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by connections, the connection pool, and DDL execution.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A connection could not be opened or re-opened.
    #[error("connect failed: {reason}")]
    Connect {
        /// Driver-reported reason.
        reason: String,
    },

    /// The database is busy or a required lock is held by another handle.
    #[error("database busy: {reason}")]
    Busy {
        /// Driver-reported reason.
        reason: String,
    },

    /// A uniqueness or integrity constraint rejected the statement.
    #[error("constraint violated: {reason}")]
    Constraint {
        /// Driver-reported reason.
        reason: String,
    },

    /// A statement failed for a reason other than busy or constraint.
    #[error("statement failed: {reason} (sql: {sql})")]
    Statement {
        /// The statement text that failed.
        sql: String,
        /// Driver-reported reason.
        reason: String,
    },

    /// The operation is not available in the active dialect.
    #[error("unsupported by {dialect}: {operation}")]
    Unsupported {
        /// Dialect name.
        dialect: &'static str,
        /// Description of the unavailable operation.
        operation: String,
    },

    /// Stored data contradicts the engine's own invariants.
    #[error("storage inconsistent: {reason}")]
    Inconsistent {
        /// Description of the contradiction.
        reason: String,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StorageError {
    /// Creates a [`StorageError::Connect`].
    pub fn connect(reason: impl Into<String>) -> Self {
        Self::Connect {
            reason: reason.into(),
        }
    }

    /// Creates a [`StorageError::Busy`].
    pub fn busy(reason: impl Into<String>) -> Self {
        Self::Busy {
            reason: reason.into(),
        }
    }

    /// Creates a [`StorageError::Constraint`].
    pub fn constraint(reason: impl Into<String>) -> Self {
        Self::Constraint {
            reason: reason.into(),
        }
    }

    /// Creates a [`StorageError::Statement`].
    pub fn statement(sql: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Statement {
            sql: sql.into(),
            reason: reason.into(),
        }
    }

    /// Creates a [`StorageError::Unsupported`].
    pub fn unsupported(dialect: &'static str, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            dialect,
            operation: operation.into(),
        }
    }

    /// Creates a [`StorageError::Inconsistent`].
    pub fn inconsistent(reason: impl Into<String>) -> Self {
        Self::Inconsistent {
            reason: reason.into(),
        }
    }

    /// Returns whether retrying the failed operation may succeed without
    /// intervention.
    ///
    /// Busy/locked conditions and connection establishment are transient;
    /// constraint violations, statement errors, and inconsistencies are
    /// not.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Busy { .. } | Self::Connect { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(StorageError::busy("database is locked").retryable());
        assert!(StorageError::connect("no such host").retryable());
        assert!(!StorageError::constraint("UNIQUE failed").retryable());
        assert!(!StorageError::statement("SELECT", "syntax error").retryable());
        assert!(!StorageError::inconsistent("cycle").retryable());
        assert!(!StorageError::Io(std::io::Error::other("disk")).retryable());
    }

    #[test]
    fn display_includes_context() {
        let err = StorageError::statement("SELECT * FROM missing", "no such table");
        let msg = err.to_string();
        assert!(msg.contains("no such table"));
        assert!(msg.contains("SELECT * FROM missing"));
    }
}
