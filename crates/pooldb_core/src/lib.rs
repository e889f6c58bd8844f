//! # pooldb Core
//!
//! The record store engine for pooldb.
//!
//! A [`Pool`] stores **typed entries**: every entry is one row in the
//! shared `pool_meta` table plus one row in its type's data table, linked
//! by `(id, pool_datatbl, pool_dataref)`, with any number of attached
//! files in a sharded blob tree next to the database.
//!
//! ## Design Principles
//!
//! - All SQL is generated against the declared registry; an unknown table
//!   or field fails before the database ever sees the statement
//! - Entry writes stage in per-handle caches and reach storage only on
//!   [`Entry::commit`], one transaction per commit, file blobs included
//! - Blobs live outside the database; replaced and deleted blobs rotate
//!   into parallel `_versions`/`_trashcan` trees per policy instead of
//!   vanishing
//! - Schema deployment is additive: [`Migrator`] creates what is missing
//!   and never drops or rewrites anything on its own
//!
//! ## Example
//!
//! ```rust
//! use pooldb_core::{Migrator, Pool, PoolConfig, Preload};
//! use pooldb_driver::{Connector, SqliteConnector};
//! use pooldb_schema::{Datatype, FieldDef, PoolStructure, Value};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let mut structure = PoolStructure::new();
//! structure.define("article", vec![
//!     FieldDef::new("header", Datatype::String).with_size(120),
//!     FieldDef::new("body", Datatype::Text),
//! ]).unwrap();
//!
//! let connector = SqliteConnector::file(dir.path().join("pool.db"));
//! let setup = connector.connect().unwrap();
//! Migrator::new(&structure).apply(setup.as_ref()).unwrap();
//! drop(setup);
//!
//! let pool = Pool::open(structure, connector, PoolConfig::new()).unwrap();
//! let entry = pool.create_entry("article", "ada").unwrap();
//! entry.set_data("header", Value::from("First post")).unwrap();
//! entry.commit("ada").unwrap();
//!
//! let again = pool.get_entry(entry.id(), Preload::All).unwrap();
//! assert_eq!(again.get_data("header").unwrap(), Value::from("First post"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod entry;
mod error;
mod files;
mod migrate;
mod pool;
mod sql;
mod stats;

pub use config::{PoolConfig, ReplacePolicy};
pub use entry::Entry;
pub use error::{PoolError, PoolResult};
pub use files::{FileHandle, FileRecord, FileStore, StoredBlob};
pub use migrate::{MigrationReport, MigrationStep, Migrator, TableReport};
pub use pool::{Pool, Preload};
pub use sql::{
    Combine, FilterValue, JoinType, Operator, ParamFilter, SelectSpec, SortField, SqlBuilder,
    SqlQuery,
};
pub use stats::{PoolStats, StatsSnapshot};
