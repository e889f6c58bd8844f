//! Datatype enumeration and table/field definitions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Name of the shared meta table every entry has a row in.
pub const META_TABLE: &str = "pool_meta";

/// Name of the file metadata table.
pub const FILE_TABLE: &str = "pool_files";

/// Name of the fulltext search table.
pub const FULLTEXT_TABLE: &str = "pool_fulltext";

/// Name of the generic system key/value table.
pub const SYS_TABLE: &str = "pool_sys";

/// Meta fields that identify an entry and are write-protected on wrappers.
pub const IDENTITY_FIELDS: [&str; 3] = ["id", "pool_datatbl", "pool_dataref"];

/// Reserved delimiter joining multi-value fields in storage.
pub const MULTIVALUE_DELIMITER: char = '\n';

/// The closed set of semantic datatypes a field can declare.
///
/// Serialization behavior per datatype is defined in [`crate::serialize_value`]
/// and [`crate::deserialize_value`]. The enumeration deliberately has no
/// "custom" escape: a field the engine cannot serialize is a field the
/// engine will not store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Datatype {
    /// Short single-line text, typically length-bounded.
    String,
    /// Unbounded text.
    Text,
    /// Signed integer.
    Number,
    /// Double-precision float.
    Float,
    /// Boolean, stored as 0/1.
    Bool,
    /// Calendar date without time of day.
    Date,
    /// Calendar date with time of day.
    Datetime,
    /// Like [`Datatype::Datetime`]; kept distinct for schema intent.
    Timestamp,
    /// Single selection out of a configured option list; stored as string.
    List,
    /// Multiple selections; stored joined by [`MULTIVALUE_DELIMITER`].
    Multilist,
    /// Reference to another entry id.
    Unit,
    /// List of entry ids; stored joined by [`MULTIVALUE_DELIMITER`].
    Unitlist,
    /// Nested JSON structure; stored as its canonical encoding.
    Json,
    /// File attachment handle; the column stores the file key.
    File,
    /// Byte size; behaves like [`Datatype::Number`].
    Bytesize,
}

impl Datatype {
    /// Short lowercase label, used in error messages and DDL mapping.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Text => "text",
            Self::Number => "number",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Date => "date",
            Self::Datetime => "datetime",
            Self::Timestamp => "timestamp",
            Self::List => "list",
            Self::Multilist => "multilist",
            Self::Unit => "unit",
            Self::Unitlist => "unitlist",
            Self::Json => "json",
            Self::File => "file",
            Self::Bytesize => "bytesize",
        }
    }

    /// Whether values of this datatype are stored as a joined sequence.
    #[must_use]
    pub fn is_multivalue(&self) -> bool {
        matches!(self, Self::Multilist | Self::Unitlist)
    }

    /// Whether this is one of the date-class datatypes.
    #[must_use]
    pub fn is_date(&self) -> bool {
        matches!(self, Self::Date | Self::Datetime | Self::Timestamp)
    }
}

/// Declaration of one field: id, semantic datatype and optional size hint.
///
/// Field declarations are plain serde types so hosts can load them from
/// configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// The field id, which is also the column name.
    pub id: String,
    /// The declared semantic datatype.
    pub datatype: Datatype,
    /// Size hint for length-bounded columns (0 = dialect default).
    #[serde(default)]
    pub size: u32,
}

impl FieldDef {
    /// Creates a field definition with no size hint.
    pub fn new(id: impl Into<String>, datatype: Datatype) -> Self {
        Self {
            id: id.into(),
            datatype,
            size: 0,
        }
    }

    /// Sets the size hint for length-bounded columns.
    #[must_use]
    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }
}

/// An ordered field list registered under a table name.
#[derive(Debug, Clone)]
pub struct TableDef {
    name: String,
    fields: Vec<FieldDef>,
    index: HashMap<String, usize>,
}

impl TableDef {
    /// Builds a table definition from validated fields.
    ///
    /// Callers are expected to have rejected duplicate field ids already;
    /// on a duplicate the last declaration wins.
    #[must_use]
    pub fn new(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        let index = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.id.clone(), i))
            .collect();
        Self {
            name: name.into(),
            fields,
            index,
        }
    }

    /// The table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Looks up one field by id.
    #[must_use]
    pub fn field(&self, id: &str) -> Option<&FieldDef> {
        self.index.get(id).map(|i| &self.fields[*i])
    }

    /// Whether the table declares the given field id.
    #[must_use]
    pub fn has_field(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// The field ids in declaration order.
    pub fn field_ids(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.id.as_str())
    }
}
