//! Native and storage value representations.

use chrono::{NaiveDate, NaiveDateTime};

/// A value as it crosses the database driver boundary.
///
/// This is the closed set of shapes that can be bound to a query parameter
/// or read back from a row. Everything richer (dates, lists, JSON) is
/// lowered to one of these by [`crate::serialize_value`].
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// A signed integer.
    Int(i64),
    /// A double-precision float.
    Float(f64),
    /// A text value.
    Text(String),
    /// A raw byte string.
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Returns `true` for SQL NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the integer content, if this is an `Int`.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text content, if this is a `Text`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// A native field value as seen by callers of the engine.
///
/// `Value` is what entry reads return and what entry writes accept. The
/// mapping to and from [`SqlValue`] is defined per [`crate::Datatype`] in
/// [`crate::serialize_value`] / [`crate::deserialize_value`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// No value. Also the deserialized form of an absent JSON or date.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer (numbers, unit references, byte sizes).
    Int(i64),
    /// A double-precision float.
    Float(f64),
    /// A text value.
    Text(String),
    /// A calendar date with time of day.
    DateTime(NaiveDateTime),
    /// A calendar date without time of day.
    Date(NaiveDate),
    /// A list of strings (multi-select fields).
    List(Vec<String>),
    /// A list of entry ids (unit-reference lists).
    Refs(Vec<i64>),
    /// A nested JSON structure.
    Json(serde_json::Value),
    /// A raw byte string.
    Binary(Vec<u8>),
}

impl Value {
    /// Returns `true` for the no-value sentinel.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the text content, if this is a `Text`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the integer content, if this is an `Int`.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the float content, if this is a `Float`.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the boolean content, if this is a `Bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the datetime content, if this is a `DateTime`.
    #[must_use]
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Self::DateTime(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the date content, if this is a `Date`.
    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string list content, if this is a `List`.
    #[must_use]
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the id list content, if this is a `Refs`.
    #[must_use]
    pub fn as_refs(&self) -> Option<&[i64]> {
        match self {
            Self::Refs(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the JSON content, if this is a `Json`.
    #[must_use]
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Short label of the value's shape, used in validation errors.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::DateTime(_) => "datetime",
            Self::Date(_) => "date",
            Self::List(_) => "list",
            Self::Refs(_) => "reference list",
            Self::Json(_) => "json",
            Self::Binary(_) => "binary",
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        // Ids are positive and well below i64::MAX in practice.
        Self::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::DateTime(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Self::List(v)
    }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Self::Refs(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_match_variants() {
        assert_eq!(Value::from("hello").as_str(), Some("hello"));
        assert_eq!(Value::from(42i64).as_int(), Some(42));
        assert_eq!(Value::from(1.5).as_float(), Some(1.5));
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert!(Value::Null.is_null());

        // Cross-shape access returns None, never coerces.
        assert_eq!(Value::from(42i64).as_str(), None);
        assert_eq!(Value::from("42").as_int(), None);
    }

    #[test]
    fn list_accessors() {
        let v = Value::from(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(v.as_list(), Some(&["a".to_string(), "b".to_string()][..]));

        let r = Value::from(vec![1i64, 2, 3]);
        assert_eq!(v.as_refs(), None);
        assert_eq!(r.as_refs(), Some(&[1i64, 2, 3][..]));
    }

    #[test]
    fn sql_value_accessors() {
        assert_eq!(SqlValue::Int(7).as_int(), Some(7));
        assert_eq!(SqlValue::from("x").as_str(), Some("x"));
        assert!(SqlValue::Null.is_null());
        assert_eq!(SqlValue::Null.as_int(), None);
    }

    #[test]
    fn type_names_are_stable() {
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::Json(serde_json::json!({})).type_name(), "json");
        assert_eq!(Value::Refs(vec![]).type_name(), "reference list");
    }
}
