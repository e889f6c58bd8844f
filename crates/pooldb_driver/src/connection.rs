//! Database connection trait definition.

use crate::dialect::Dialect;
use crate::error::StorageResult;
use pooldb_schema::SqlValue;

/// A live database connection for pooldb.
///
/// Connections are **statement executors**. They bind ordered parameters,
/// run one statement at a time, and expose just enough transaction control
/// for the record store. pooldb owns all SQL text generation - connections
/// do not build queries or interpret schemas.
///
/// # Invariants
///
/// - `execute` and `query` bind `params` in order to positional `?`
///   placeholders
/// - `insert_id` returns the row id produced by the most recent `INSERT`
///   on this connection
/// - `begin`/`commit`/`rollback` delimit one transaction; nesting is not
///   supported
/// - Implementations must be `Send + Sync` so the pool can hand
///   connections to any thread
///
/// # Implementors
///
/// - [`super::SqliteConnection`] - rusqlite-backed, file or in-memory
pub trait DbConnection: Send + Sync {
    /// Returns the SQL dialect this connection speaks.
    fn dialect(&self) -> Dialect;

    /// Executes a statement that returns no rows.
    ///
    /// Returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails; busy/locked conditions
    /// are classified retryable.
    fn execute(&self, sql: &str, params: &[SqlValue]) -> StorageResult<usize>;

    /// Runs a query and materializes all result rows.
    ///
    /// Every cell is lowered to a [`SqlValue`]; column order follows the
    /// select list.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be read.
    fn query(&self, sql: &str, params: &[SqlValue]) -> StorageResult<Vec<Vec<SqlValue>>>;

    /// Returns the row id generated by the most recent `INSERT`.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver cannot report the id.
    fn insert_id(&self) -> StorageResult<i64>;

    /// Opens a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if a transaction is already open or the statement
    /// fails.
    fn begin(&self) -> StorageResult<()>;

    /// Commits the open transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails; the transaction state is
    /// then undefined and the connection should be rolled back or
    /// discarded.
    fn commit(&self) -> StorageResult<()>;

    /// Rolls back the open transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback statement itself fails.
    fn rollback(&self) -> StorageResult<()>;

    /// Probes whether the connection still answers.
    ///
    /// Never errors; a failed probe returns `false`.
    fn ping(&self) -> bool;

    /// Re-establishes the underlying connection in place.
    ///
    /// In-memory connections treat this as a no-op since reopening would
    /// discard their data.
    ///
    /// # Errors
    ///
    /// Returns a retryable error if the new connection cannot be opened.
    fn reconnect(&self) -> StorageResult<()>;
}
