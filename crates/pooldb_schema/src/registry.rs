//! The schema registry mapping table names to field definitions.

use crate::error::{SchemaError, SchemaResult};
use crate::types::{
    Datatype, FieldDef, TableDef, FILE_TABLE, FULLTEXT_TABLE, META_TABLE, SYS_TABLE,
};
use std::collections::BTreeMap;

/// Longest accepted identifier; matches the stricter dialect (MySQL).
const MAX_IDENTIFIER_LEN: usize = 64;

/// Validates a table or column name for direct use in SQL text.
///
/// Parameter values are always bound positionally, but identifiers cannot
/// be parameterized, so every name that reaches query or DDL text must pass
/// this check first.
///
/// # Errors
///
/// Returns [`SchemaError::InvalidIdentifier`] if the name is empty, too
/// long, starts with a digit, or contains anything outside
/// `[A-Za-z0-9_]`.
pub fn validate_identifier(name: &str) -> SchemaResult<()> {
    if name.is_empty() {
        return Err(SchemaError::invalid_identifier(name, "empty name"));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(SchemaError::invalid_identifier(name, "name too long"));
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap_or('_');
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(SchemaError::invalid_identifier(
            name,
            "must start with a letter or underscore",
        ));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(SchemaError::invalid_identifier(
            name,
            "only letters, digits and underscores are allowed",
        ));
    }
    Ok(())
}

/// Whether the name is one of the fixed engine tables.
fn is_system_table(name: &str) -> bool {
    matches!(name, META_TABLE | FILE_TABLE | FULLTEXT_TABLE | SYS_TABLE)
}

/// The registry of table definitions driving serialization and queries.
///
/// A fresh structure always contains the four system tables (`pool_meta`,
/// `pool_files`, `pool_fulltext`, `pool_sys`); hosts add one data table per
/// entry type with [`PoolStructure::define`] before opening a pool.
///
/// The structure is read-mostly: once it is handed to a pool it is shared
/// immutably (`Arc`), so concurrent reads need no locking. Schema reloads
/// happen by building a new structure and opening a new pool.
#[derive(Debug, Clone)]
pub struct PoolStructure {
    tables: BTreeMap<String, TableDef>,
}

impl PoolStructure {
    /// Creates a structure seeded with the system table definitions.
    #[must_use]
    pub fn new() -> Self {
        let mut tables = BTreeMap::new();
        tables.insert(
            META_TABLE.to_string(),
            TableDef::new(META_TABLE, meta_fields()),
        );
        tables.insert(
            FILE_TABLE.to_string(),
            TableDef::new(FILE_TABLE, file_fields()),
        );
        tables.insert(
            FULLTEXT_TABLE.to_string(),
            TableDef::new(FULLTEXT_TABLE, fulltext_fields()),
        );
        tables.insert(SYS_TABLE.to_string(), TableDef::new(SYS_TABLE, sys_fields()));
        Self { tables }
    }

    /// Registers (or overwrites) a data table for one entry type.
    ///
    /// An `id` primary-key field is prepended automatically when the
    /// declaration does not contain one; every data row needs it as the
    /// target of `pool_dataref`.
    ///
    /// # Errors
    ///
    /// Fails with [`SchemaError`] when the table name is reserved, any
    /// identifier is invalid, or a field id repeats.
    pub fn define(&mut self, table: &str, fields: Vec<FieldDef>) -> SchemaResult<()> {
        if is_system_table(table) {
            return Err(SchemaError::reserved_table(table));
        }
        validate_identifier(table)?;

        let mut all = Vec::with_capacity(fields.len() + 1);
        if !fields.iter().any(|f| f.id == "id") {
            all.push(FieldDef::new("id", Datatype::Number));
        }
        all.extend(fields);

        let mut seen = std::collections::HashSet::new();
        for field in &all {
            validate_identifier(&field.id)?;
            if !seen.insert(field.id.as_str()) {
                return Err(SchemaError::duplicate_field(table, &field.id));
            }
        }

        self.tables
            .insert(table.to_string(), TableDef::new(table, all));
        Ok(())
    }

    /// Looks up a table definition.
    ///
    /// # Errors
    ///
    /// Fails with [`SchemaError::UnknownTable`] for unregistered names.
    pub fn table(&self, name: &str) -> SchemaResult<&TableDef> {
        self.tables
            .get(name)
            .ok_or_else(|| SchemaError::unknown_table(name))
    }

    /// Whether a table is registered (system or data).
    #[must_use]
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Whether a name is a registered data (entry type) table.
    #[must_use]
    pub fn is_type_table(&self, name: &str) -> bool {
        !is_system_table(name) && self.tables.contains_key(name)
    }

    /// All registered tables, system tables included, in name order.
    pub fn tables(&self) -> impl Iterator<Item = &TableDef> {
        self.tables.values()
    }

    /// The registered data tables, in name order.
    pub fn type_tables(&self) -> impl Iterator<Item = &TableDef> {
        self.tables.values().filter(|t| !is_system_table(t.name()))
    }

    /// Looks up one field definition.
    ///
    /// # Errors
    ///
    /// Fails with [`SchemaError`] if the table or field is unknown.
    pub fn field(&self, table: &str, field: &str) -> SchemaResult<&FieldDef> {
        self.table(table)?
            .field(field)
            .ok_or_else(|| SchemaError::unknown_field(table, field))
    }

    /// The declared datatype of one field.
    ///
    /// # Errors
    ///
    /// Fails with [`SchemaError`] if the table or field is unknown.
    pub fn field_type(&self, table: &str, field: &str) -> SchemaResult<Datatype> {
        Ok(self.field(table, field)?.datatype)
    }

    /// Whether the table declares the field.
    #[must_use]
    pub fn has_field(&self, table: &str, field: &str) -> bool {
        self.tables
            .get(table)
            .is_some_and(|t| t.has_field(field))
    }
}

impl Default for PoolStructure {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed columns of the shared meta table, in storage order.
fn meta_fields() -> Vec<FieldDef> {
    vec![
        FieldDef::new("id", Datatype::Number),
        FieldDef::new("title", Datatype::String).with_size(255),
        FieldDef::new("pool_type", Datatype::String).with_size(64),
        FieldDef::new("pool_state", Datatype::Number),
        FieldDef::new("pool_create", Datatype::Datetime),
        FieldDef::new("pool_change", Datatype::Datetime),
        FieldDef::new("pool_createdby", Datatype::String).with_size(64),
        FieldDef::new("pool_changedby", Datatype::String).with_size(64),
        FieldDef::new("pool_unitref", Datatype::Unit),
        FieldDef::new("pool_sort", Datatype::Number),
        FieldDef::new("pool_stag", Datatype::Number),
        FieldDef::new("pool_datatbl", Datatype::String).with_size(64),
        FieldDef::new("pool_dataref", Datatype::Number),
        FieldDef::new("pool_wfp", Datatype::String).with_size(64),
        FieldDef::new("pool_wfa", Datatype::String).with_size(64),
        FieldDef::new("pool_filename", Datatype::String).with_size(255),
    ]
}

/// Columns of the file metadata table.
fn file_fields() -> Vec<FieldDef> {
    vec![
        FieldDef::new("id", Datatype::Number),
        FieldDef::new("fileid", Datatype::Number),
        FieldDef::new("filekey", Datatype::String).with_size(255),
        FieldDef::new("path", Datatype::String).with_size(255),
        FieldDef::new("filename", Datatype::String).with_size(255),
        FieldDef::new("size", Datatype::Bytesize),
        FieldDef::new("extension", Datatype::String).with_size(16),
        FieldDef::new("version", Datatype::String).with_size(16),
    ]
}

/// Columns of the fulltext search table.
fn fulltext_fields() -> Vec<FieldDef> {
    vec![
        FieldDef::new("id", Datatype::Number),
        FieldDef::new("text", Datatype::Text),
    ]
}

/// Columns of the generic system key/value table.
fn sys_fields() -> Vec<FieldDef> {
    vec![
        FieldDef::new("id", Datatype::String).with_size(255),
        FieldDef::new("value", Datatype::Text),
        FieldDef::new("ts", Datatype::Datetime),
    ]
}
