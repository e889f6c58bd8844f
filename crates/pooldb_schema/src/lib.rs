//! # pooldb Schema
//!
//! Schema registry, datatype enumeration and value serialization for pooldb.
//!
//! Entry types are not known at compile time: the hosting application
//! declares, per table, an ordered list of fields with semantic datatypes,
//! and every query-building and serialization path goes through that
//! registry. This crate is pure data transformation - it performs no I/O.
//!
//! ## Design Principles
//!
//! - Datatypes are a closed enumeration ([`Datatype`]), not dynamic type
//!   inspection
//! - [`PoolStructure`] is immutable once shared; concurrent reads need no
//!   synchronization
//! - [`serialize_value`] fails fast on values that cannot be coerced;
//!   [`deserialize_value`] is total and maps undecodable stored data to
//!   documented defaults
//! - Multi-value fields join with a reserved delimiter and always
//!   deserialize to a sequence, never to a null-vs-empty ambiguity
//!
//! ## Example
//!
//! ```rust
//! use pooldb_schema::{Datatype, FieldDef, PoolStructure};
//!
//! let mut structure = PoolStructure::new();
//! structure
//!     .define(
//!         "article",
//!         vec![
//!             FieldDef::new("body", Datatype::Text),
//!             FieldDef::new("rating", Datatype::Number),
//!         ],
//!     )
//!     .unwrap();
//!
//! assert_eq!(
//!     structure.field_type("article", "rating").unwrap(),
//!     Datatype::Number
//! );
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod convert;
mod error;
mod registry;
mod types;
mod value;

pub use convert::{deserialize_value, serialize_value, DATETIME_FORMAT, DATE_FORMAT};
pub use error::{SchemaError, SchemaResult, ValidationError};
pub use registry::{validate_identifier, PoolStructure};
pub use types::{
    Datatype, FieldDef, TableDef, FILE_TABLE, FULLTEXT_TABLE, IDENTITY_FIELDS, META_TABLE,
    MULTIVALUE_DELIMITER, SYS_TABLE,
};
pub use value::{SqlValue, Value};
