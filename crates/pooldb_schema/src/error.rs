//! Error types for schema and serialization failures.

use thiserror::Error;

/// Result type for schema lookups.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors caused by a declared schema that does not match its use.
///
/// Every variant is a configuration bug on the caller's side. Schema errors
/// are never retryable and never caused by the state of the database.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// The table has no registered definition.
    #[error("unknown table '{table}'")]
    UnknownTable {
        /// The table name that was looked up.
        table: String,
    },

    /// The field is not declared in the table's definition.
    #[error("unknown field '{field}' in table '{table}'")]
    UnknownField {
        /// The table that was searched.
        table: String,
        /// The field id that was looked up.
        field: String,
    },

    /// A table or field name is not a usable SQL identifier.
    #[error("invalid identifier '{name}': {reason}")]
    InvalidIdentifier {
        /// The offending name.
        name: String,
        /// Why the name was rejected.
        reason: String,
    },

    /// An attempt to redefine one of the fixed system tables.
    #[error("table '{table}' is reserved for the engine")]
    ReservedTable {
        /// The reserved table name.
        table: String,
    },

    /// The same field id appears twice in one table definition.
    #[error("duplicate field '{field}' in table '{table}'")]
    DuplicateField {
        /// The table being defined.
        table: String,
        /// The repeated field id.
        field: String,
    },

    /// A filter cannot be rendered against this field.
    #[error("field '{field}' is not queryable this way: {reason}")]
    InvalidFilter {
        /// The field the filter names.
        field: String,
        /// Why the filter was rejected.
        reason: String,
    },

    /// An insert or update was built with no columns.
    #[error("nothing to write for table '{table}'")]
    EmptyWrite {
        /// The table the write names.
        table: String,
    },
}

impl SchemaError {
    /// Creates an `UnknownTable` error.
    pub fn unknown_table(table: impl Into<String>) -> Self {
        Self::UnknownTable {
            table: table.into(),
        }
    }

    /// Creates an `UnknownField` error.
    pub fn unknown_field(table: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField {
            table: table.into(),
            field: field.into(),
        }
    }

    /// Creates an `InvalidIdentifier` error.
    pub fn invalid_identifier(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `ReservedTable` error.
    pub fn reserved_table(table: impl Into<String>) -> Self {
        Self::ReservedTable {
            table: table.into(),
        }
    }

    /// Creates a `DuplicateField` error.
    pub fn duplicate_field(table: impl Into<String>, field: impl Into<String>) -> Self {
        Self::DuplicateField {
            table: table.into(),
            field: field.into(),
        }
    }

    /// Creates an `InvalidFilter` error.
    pub fn invalid_filter(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFilter {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `EmptyWrite` error.
    pub fn empty_write(table: impl Into<String>) -> Self {
        Self::EmptyWrite {
            table: table.into(),
        }
    }
}

/// A value that cannot be coerced to its field's declared datatype.
///
/// Raised at write time, before anything is staged, so one bad field never
/// corrupts an otherwise valid pending buffer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The value's shape does not fit the datatype at all.
    #[error("field '{field}': expected {expected}, got {actual}")]
    TypeMismatch {
        /// The field being written.
        field: String,
        /// Label of the declared datatype.
        expected: &'static str,
        /// Label of the value that was supplied.
        actual: &'static str,
    },

    /// A text value could not be parsed as a number.
    #[error("field '{field}': '{value}' is not a valid number")]
    BadNumber {
        /// The field being written.
        field: String,
        /// The rejected input.
        value: String,
    },

    /// A text value could not be parsed as a boolean.
    #[error("field '{field}': '{value}' is not a valid boolean")]
    BadBool {
        /// The field being written.
        field: String,
        /// The rejected input.
        value: String,
    },

    /// A text value could not be parsed as a date or datetime.
    #[error("field '{field}': '{value}' is not a valid date")]
    BadDate {
        /// The field being written.
        field: String,
        /// The rejected input.
        value: String,
    },

    /// A text value is not valid JSON.
    #[error("field '{field}': invalid JSON: {reason}")]
    BadJson {
        /// The field being written.
        field: String,
        /// The parser's complaint.
        reason: String,
    },

    /// A multi-value item contains the reserved join delimiter.
    #[error("field '{field}': list items must not contain the reserved '\\n' delimiter")]
    DelimiterCollision {
        /// The field being written.
        field: String,
    },
}

impl ValidationError {
    /// Creates a `TypeMismatch` error.
    pub fn type_mismatch(
        field: impl Into<String>,
        expected: &'static str,
        actual: &'static str,
    ) -> Self {
        Self::TypeMismatch {
            field: field.into(),
            expected,
            actual,
        }
    }

    /// Creates a `BadNumber` error.
    pub fn bad_number(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::BadNumber {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Creates a `BadBool` error.
    pub fn bad_bool(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::BadBool {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Creates a `BadDate` error.
    pub fn bad_date(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::BadDate {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Creates a `BadJson` error.
    pub fn bad_json(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BadJson {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `DelimiterCollision` error.
    pub fn delimiter_collision(field: impl Into<String>) -> Self {
        Self::DelimiterCollision {
            field: field.into(),
        }
    }
}
