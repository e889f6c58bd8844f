//! # pooldb Driver
//!
//! Database dialects, connection trait, and SQLite driver for pooldb.
//!
//! This crate provides the database abstraction for pooldb. Connections
//! are **statement executors** - they bind ordered parameters and run one
//! statement at a time, with no knowledge of schemas or query building.
//!
//! ## Design Principles
//!
//! - Connections execute prepared text with positional `?` parameters
//! - Dialects are pure text generators (DDL, introspection queries)
//! - pooldb owns all SQL generation and schema interpretation
//! - Must be `Send + Sync` so the pool can hand connections to any thread
//!
//! ## Available Connectors
//!
//! - [`SqliteConnector`] - File-backed or in-memory SQLite via rusqlite
//!
//! ## Example
//!
//! ```rust
//! use pooldb_driver::{ConnectionPool, PoolOptions, SqliteConnector};
//! use pooldb_schema::SqlValue;
//! use std::sync::Arc;
//!
//! let pool = ConnectionPool::new(Arc::new(SqliteConnector::memory()), PoolOptions::new());
//! let conn = pool.checkout().unwrap();
//! conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", &[]).unwrap();
//! conn.execute("INSERT INTO t (name) VALUES (?)", &[SqlValue::from("a")]).unwrap();
//! assert_eq!(conn.insert_id().unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod connection;
mod dialect;
mod error;
mod pool;
mod sqlite;

pub use connection::DbConnection;
pub use dialect::Dialect;
pub use error::{StorageError, StorageResult};
pub use pool::{ConnectionPool, Connector, PoolOptions, PooledConnection};
pub use sqlite::{SqliteConnection, SqliteConnector};
