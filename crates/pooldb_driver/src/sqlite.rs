//! SQLite connection backed by rusqlite.

use crate::connection::DbConnection;
use crate::dialect::Dialect;
use crate::error::{StorageError, StorageResult};
use crate::pool::Connector;
use parking_lot::Mutex;
use pooldb_schema::SqlValue;
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, ErrorCode};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Default lock-wait bound applied to every new connection.
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Pragmas applied to every new connection.
///
/// Truncate journaling plus relaxed synchronous writes trade durability of
/// the last transaction for write throughput; the record store re-reads
/// its state on open, so a torn tail costs one transaction at most.
const CONNECT_PRAGMAS: &str = "PRAGMA journal_mode = TRUNCATE; PRAGMA synchronous = OFF;";

#[derive(Debug, Clone)]
enum Source {
    File {
        path: PathBuf,
        busy_timeout: Duration,
    },
    Memory,
}

/// A SQLite connection guarded by a mutex.
///
/// rusqlite connections are `Send` but not `Sync`; the mutex serializes
/// statement execution so one handle satisfies the [`DbConnection`]
/// `Send + Sync` bound. One logical context per handle remains the rule -
/// the lock makes interleaving safe, not sensible.
pub struct SqliteConnection {
    conn: Mutex<Connection>,
    source: Source,
}

impl SqliteConnection {
    /// Opens a file-backed database, creating it when missing.
    ///
    /// # Errors
    ///
    /// Returns a retryable [`StorageError::Connect`] if the file cannot be
    /// opened.
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        Self::from_source(Source::File {
            path: path.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        })
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connect`] if SQLite cannot allocate the
    /// database.
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::from_source(Source::Memory)
    }

    fn from_source(source: Source) -> StorageResult<Self> {
        let conn = open_raw(&source)?;
        Ok(Self {
            conn: Mutex::new(conn),
            source,
        })
    }
}

fn open_raw(source: &Source) -> StorageResult<Connection> {
    let (conn, busy_timeout) = match source {
        Source::File { path, busy_timeout } => {
            debug!("opening sqlite database at {:?}", path);
            let conn =
                Connection::open(path).map_err(|e| StorageError::connect(e.to_string()))?;
            (conn, *busy_timeout)
        }
        Source::Memory => {
            let conn =
                Connection::open_in_memory().map_err(|e| StorageError::connect(e.to_string()))?;
            (conn, DEFAULT_BUSY_TIMEOUT)
        }
    };
    conn.busy_timeout(busy_timeout)
        .map_err(|e| StorageError::connect(e.to_string()))?;
    conn.execute_batch(CONNECT_PRAGMAS)
        .map_err(|e| StorageError::connect(e.to_string()))?;
    Ok(conn)
}

impl DbConnection for SqliteConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> StorageResult<usize> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(sql).map_err(|e| classify(sql, &e))?;
        let changed = stmt
            .execute(params_from_iter(params.iter().map(bind_param)))
            .map_err(|e| classify(sql, &e))?;
        debug!("execute ({changed} rows): {sql}");
        Ok(changed)
    }

    fn query(&self, sql: &str, params: &[SqlValue]) -> StorageResult<Vec<Vec<SqlValue>>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(sql).map_err(|e| classify(sql, &e))?;
        let columns = stmt.column_count();
        let mut rows = stmt
            .query(params_from_iter(params.iter().map(bind_param)))
            .map_err(|e| classify(sql, &e))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| classify(sql, &e))? {
            let mut values = Vec::with_capacity(columns);
            for i in 0..columns {
                let cell = row.get_ref(i).map_err(|e| classify(sql, &e))?;
                values.push(read_cell(cell));
            }
            out.push(values);
        }
        debug!("query ({} rows): {sql}", out.len());
        Ok(out)
    }

    fn insert_id(&self) -> StorageResult<i64> {
        Ok(self.conn.lock().last_insert_rowid())
    }

    fn begin(&self) -> StorageResult<()> {
        self.conn
            .lock()
            .execute_batch("BEGIN")
            .map_err(|e| classify("BEGIN", &e))
    }

    fn commit(&self) -> StorageResult<()> {
        self.conn
            .lock()
            .execute_batch("COMMIT")
            .map_err(|e| classify("COMMIT", &e))
    }

    fn rollback(&self) -> StorageResult<()> {
        self.conn
            .lock()
            .execute_batch("ROLLBACK")
            .map_err(|e| classify("ROLLBACK", &e))
    }

    fn ping(&self) -> bool {
        self.conn
            .lock()
            .query_row("SELECT 1", [], |_| Ok(()))
            .is_ok()
    }

    fn reconnect(&self) -> StorageResult<()> {
        match &self.source {
            // Reopening a memory database would discard it.
            Source::Memory => Ok(()),
            Source::File { path, .. } => {
                debug!("reconnecting sqlite database at {:?}", path);
                let fresh = open_raw(&self.source)?;
                *self.conn.lock() = fresh;
                Ok(())
            }
        }
    }
}

/// Connector producing [`SqliteConnection`] handles.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    source: Source,
}

impl SqliteConnector {
    /// Connector for a file-backed database.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::File {
                path: path.into(),
                busy_timeout: DEFAULT_BUSY_TIMEOUT,
            },
        }
    }

    /// Connector for a private in-memory database.
    ///
    /// Every `connect` call opens a distinct database, so pools over this
    /// connector only make sense where a single connection is ever live
    /// (tests). File-backed connectors have no such restriction.
    #[must_use]
    pub fn memory() -> Self {
        Self {
            source: Source::Memory,
        }
    }

    /// Overrides the lock-wait bound for file-backed connections.
    #[must_use]
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        if let Source::File { busy_timeout, .. } = &mut self.source {
            *busy_timeout = timeout;
        }
        self
    }
}

impl Connector for SqliteConnector {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn connect(&self) -> StorageResult<Box<dyn DbConnection>> {
        Ok(Box::new(SqliteConnection::from_source(self.source.clone())?))
    }
}

fn bind_param(value: &SqlValue) -> rusqlite::types::Value {
    match value {
        SqlValue::Null => rusqlite::types::Value::Null,
        SqlValue::Int(v) => rusqlite::types::Value::Integer(*v),
        SqlValue::Float(v) => rusqlite::types::Value::Real(*v),
        SqlValue::Text(s) => rusqlite::types::Value::Text(s.clone()),
        SqlValue::Blob(b) => rusqlite::types::Value::Blob(b.clone()),
    }
}

fn read_cell(cell: ValueRef<'_>) -> SqlValue {
    match cell {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Int(v),
        ValueRef::Real(v) => SqlValue::Float(v),
        ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
    }
}

fn classify(sql: &str, err: &rusqlite::Error) -> StorageError {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            let reason = match message {
                Some(m) => m.clone(),
                None => code.to_string(),
            };
            match code.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => StorageError::busy(reason),
                ErrorCode::ConstraintViolation => StorageError::constraint(reason),
                _ => StorageError::statement(sql, reason),
            }
        }
        other => StorageError::statement(sql, other.to_string()),
    }
}
