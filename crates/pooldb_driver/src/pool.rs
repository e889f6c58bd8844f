//! Connection checkout/checkin pool.
//!
//! Every logical context (request, worker, migration run) checks out its
//! own handle, uses it, and returns it by dropping the guard. Handles are
//! never shared mid-transaction; the pool is a reuse cache, not a limiter.

use crate::connection::DbConnection;
use crate::dialect::Dialect;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Opens connections for a [`ConnectionPool`].
///
/// Implementations carry everything needed to open a fresh connection
/// (path, credentials, pragmas). One connector per pool.
pub trait Connector: Send + Sync {
    /// Returns the dialect of the connections this connector opens.
    fn dialect(&self) -> Dialect;

    /// Opens a fresh connection.
    ///
    /// # Errors
    ///
    /// Returns a retryable [`StorageError::Connect`] if the database is
    /// unreachable.
    fn connect(&self) -> StorageResult<Box<dyn DbConnection>>;
}

/// Tuning knobs for a [`ConnectionPool`].
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Maximum number of idle connections retained for reuse.
    pub max_idle: usize,

    /// Idle age after which a connection is ping-probed before reuse.
    pub revalidate_after: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_idle: 8,
            revalidate_after: Duration::from_secs(60),
        }
    }
}

impl PoolOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of idle connections retained.
    #[must_use]
    pub const fn max_idle(mut self, value: usize) -> Self {
        self.max_idle = value;
        self
    }

    /// Sets the idle age that triggers revalidation.
    #[must_use]
    pub const fn revalidate_after(mut self, value: Duration) -> Self {
        self.revalidate_after = value;
        self
    }
}

struct IdleConn {
    conn: Arc<dyn DbConnection>,
    since: Instant,
}

/// A pool of reusable database connections.
///
/// `checkout` hands out a [`PooledConnection`] guard; dropping the guard
/// returns the connection to the idle list (up to `max_idle`). An idle
/// connection older than `revalidate_after` is ping-probed before reuse
/// and reconnected or replaced when the probe fails.
pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    options: PoolOptions,
    idle: Mutex<Vec<IdleConn>>,
}

impl ConnectionPool {
    /// Creates a pool over a connector. No connection is opened until the
    /// first checkout.
    pub fn new(connector: Arc<dyn Connector>, options: PoolOptions) -> Self {
        Self {
            connector,
            options,
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Returns the dialect of this pool's connections.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.connector.dialect()
    }

    /// Checks out a connection, reusing an idle one when available.
    ///
    /// # Errors
    ///
    /// Returns a retryable [`StorageError::Connect`] if no idle connection
    /// is usable and a fresh one cannot be opened.
    pub fn checkout(&self) -> StorageResult<PooledConnection<'_>> {
        let idle = self.idle.lock().pop();
        let conn = match idle {
            Some(slot) => self.revalidate(slot)?,
            None => Arc::from(self.connector.connect()?),
        };
        Ok(PooledConnection { conn, pool: self })
    }

    /// Runs `f` inside a transaction on a checked-out connection.
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err`.
    /// A rollback failure is ignored so it cannot mask the original
    /// error.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or a converted [`StorageError`] from
    /// checkout, begin, or commit.
    pub fn with_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StorageError>,
        F: FnOnce(&dyn DbConnection) -> Result<T, E>,
    {
        let conn = self.checkout().map_err(E::from)?;
        conn.begin().map_err(E::from)?;
        match f(&*conn) {
            Ok(value) => {
                conn.commit().map_err(E::from)?;
                Ok(value)
            }
            Err(err) => {
                let _ = conn.rollback();
                Err(err)
            }
        }
    }

    /// Number of idle connections currently retained.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    fn revalidate(&self, slot: IdleConn) -> StorageResult<Arc<dyn DbConnection>> {
        if slot.since.elapsed() < self.options.revalidate_after {
            return Ok(slot.conn);
        }
        if slot.conn.ping() {
            return Ok(slot.conn);
        }
        debug!("idle connection failed ping, reconnecting");
        match slot.conn.reconnect() {
            Ok(()) => Ok(slot.conn),
            Err(err) => {
                warn!("reconnect failed ({err}), opening a fresh connection");
                Ok(Arc::from(self.connector.connect()?))
            }
        }
    }

    fn checkin(&self, conn: Arc<dyn DbConnection>) {
        let mut idle = self.idle.lock();
        if idle.len() < self.options.max_idle {
            idle.push(IdleConn {
                conn,
                since: Instant::now(),
            });
        }
    }
}

/// A checked-out connection, returned to the pool on drop.
pub struct PooledConnection<'a> {
    conn: Arc<dyn DbConnection>,
    pool: &'a ConnectionPool,
}

impl Deref for PooledConnection<'_> {
    type Target = dyn DbConnection;

    fn deref(&self) -> &Self::Target {
        &*self.conn
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        self.pool.checkin(Arc::clone(&self.conn));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteConnector;
    use pooldb_schema::SqlValue;

    fn file_pool(dir: &tempfile::TempDir, options: PoolOptions) -> ConnectionPool {
        let connector = SqliteConnector::file(dir.path().join("pool.db"));
        ConnectionPool::new(Arc::new(connector), options)
    }

    #[test]
    fn checkout_reuses_idle_connection() {
        let pool = ConnectionPool::new(Arc::new(SqliteConnector::memory()), PoolOptions::new());
        {
            let conn = pool.checkout().unwrap();
            conn.execute("CREATE TABLE t (v INTEGER)", &[]).unwrap();
        }
        assert_eq!(pool.idle_count(), 1);
        // The second checkout sees the table, proving it is the same
        // connection (distinct memory connections get distinct databases).
        let conn = pool.checkout().unwrap();
        conn.execute("INSERT INTO t (v) VALUES (?)", &[SqlValue::Int(1)])
            .unwrap();
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn max_idle_bounds_retention() {
        let dir = tempfile::tempdir().unwrap();
        let pool = file_pool(&dir, PoolOptions::new().max_idle(1));
        let a = pool.checkout().unwrap();
        let b = pool.checkout().unwrap();
        drop(a);
        drop(b);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn stale_connection_is_revalidated() {
        let dir = tempfile::tempdir().unwrap();
        // Zero interval forces the ping probe on every reuse.
        let pool = file_pool(&dir, PoolOptions::new().revalidate_after(Duration::ZERO));
        {
            let conn = pool.checkout().unwrap();
            conn.execute("CREATE TABLE t (v INTEGER)", &[]).unwrap();
        }
        let conn = pool.checkout().unwrap();
        let rows = conn.query("SELECT COUNT(*) FROM t", &[]).unwrap();
        assert_eq!(rows, vec![vec![SqlValue::Int(0)]]);
    }

    #[test]
    fn with_transaction_commits_on_ok() {
        let pool = ConnectionPool::new(Arc::new(SqliteConnector::memory()), PoolOptions::new());
        pool.checkout()
            .unwrap()
            .execute("CREATE TABLE t (v INTEGER)", &[])
            .unwrap();

        pool.with_transaction::<_, StorageError, _>(|conn| {
            conn.execute("INSERT INTO t (v) VALUES (?)", &[SqlValue::Int(1)])?;
            conn.execute("INSERT INTO t (v) VALUES (?)", &[SqlValue::Int(2)])?;
            Ok(())
        })
        .unwrap();

        let conn = pool.checkout().unwrap();
        let rows = conn.query("SELECT COUNT(*) FROM t", &[]).unwrap();
        assert_eq!(rows, vec![vec![SqlValue::Int(2)]]);
    }

    #[test]
    fn with_transaction_rolls_back_on_err() {
        let pool = ConnectionPool::new(Arc::new(SqliteConnector::memory()), PoolOptions::new());
        pool.checkout()
            .unwrap()
            .execute("CREATE TABLE t (v INTEGER)", &[])
            .unwrap();

        let result: Result<(), StorageError> = pool.with_transaction(|conn| {
            conn.execute("INSERT INTO t (v) VALUES (?)", &[SqlValue::Int(1)])?;
            Err(StorageError::inconsistent("forced failure"))
        });
        assert!(result.is_err());

        let conn = pool.checkout().unwrap();
        let rows = conn.query("SELECT COUNT(*) FROM t", &[]).unwrap();
        assert_eq!(rows, vec![vec![SqlValue::Int(0)]]);
    }
}
