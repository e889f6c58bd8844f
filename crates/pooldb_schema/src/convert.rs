//! Per-datatype value serialization.
//!
//! [`serialize_value`] lowers a native [`Value`] to the storage shape for a
//! declared [`Datatype`], failing fast when the value cannot be coerced.
//! [`deserialize_value`] is the total inverse: whatever is found in storage
//! maps to a native value, with undecodable input falling back to the
//! datatype's default (empty string, zero, `Null` for dates and JSON,
//! empty sequence for multi-value fields) rather than erroring a read.

use crate::error::ValidationError;
use crate::types::{Datatype, MULTIVALUE_DELIMITER};
use crate::value::{SqlValue, Value};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Storage format for datetime values.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Storage format for date-only values.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Serializes a native value to its storage shape.
///
/// `field` is only used for error reporting.
///
/// # Errors
///
/// Returns a [`ValidationError`] when the value cannot be coerced to the
/// declared datatype. Nothing is partially converted: an error here means
/// storage was not touched.
pub fn serialize_value(
    datatype: Datatype,
    field: &str,
    value: &Value,
) -> Result<SqlValue, ValidationError> {
    match datatype {
        Datatype::String | Datatype::Text | Datatype::List => serialize_text(field, value),
        Datatype::Number | Datatype::Bytesize | Datatype::Unit => serialize_int(field, value),
        Datatype::Float => serialize_float(field, value),
        Datatype::Bool => serialize_bool(field, value),
        Datatype::Date => serialize_date(field, value),
        Datatype::Datetime | Datatype::Timestamp => serialize_datetime(field, value),
        Datatype::Multilist => serialize_multilist(field, value),
        Datatype::Unitlist => serialize_unitlist(field, value),
        Datatype::Json => serialize_json(field, value),
        Datatype::File => serialize_file(field, value),
    }
}

/// Deserializes a storage value back to its native shape.
///
/// Total by design: reads never fail on odd stored data. A raw
/// [`SqlValue::Blob`] passes through as [`Value::Binary`] for every
/// datatype.
#[must_use]
pub fn deserialize_value(datatype: Datatype, value: SqlValue) -> Value {
    if let SqlValue::Blob(bytes) = value {
        return Value::Binary(bytes);
    }
    match datatype {
        Datatype::String | Datatype::Text | Datatype::List | Datatype::File => {
            Value::Text(text_of(value))
        }
        Datatype::Number | Datatype::Bytesize | Datatype::Unit => Value::Int(int_of(value)),
        Datatype::Float => Value::Float(float_of(value)),
        Datatype::Bool => Value::Bool(bool_of(value)),
        Datatype::Date => match date_of(&value) {
            Some(d) => Value::Date(d),
            None => Value::Null,
        },
        Datatype::Datetime | Datatype::Timestamp => match datetime_of(&value) {
            Some(dt) => Value::DateTime(dt),
            None => Value::Null,
        },
        Datatype::Multilist => Value::List(split_multi(&text_of(value))),
        Datatype::Unitlist => Value::Refs(
            split_multi(&text_of(value))
                .iter()
                .filter_map(|s| s.trim().parse::<i64>().ok())
                .collect(),
        ),
        Datatype::Json => match value {
            SqlValue::Null => Value::Null,
            SqlValue::Text(s) if s.is_empty() => Value::Null,
            SqlValue::Text(s) => match serde_json::from_str(&s) {
                Ok(v) => Value::Json(v),
                Err(_) => Value::Null,
            },
            other => match serde_json::from_str(&text_of(other)) {
                Ok(v) => Value::Json(v),
                Err(_) => Value::Null,
            },
        },
    }
}

fn serialize_text(field: &str, value: &Value) -> Result<SqlValue, ValidationError> {
    match value {
        Value::Null => Ok(SqlValue::Text(String::new())),
        Value::Text(s) => Ok(SqlValue::Text(s.clone())),
        Value::Int(v) => Ok(SqlValue::Text(v.to_string())),
        Value::Float(v) => Ok(SqlValue::Text(v.to_string())),
        Value::Bool(v) => Ok(SqlValue::Text(if *v { "true" } else { "false" }.to_string())),
        Value::DateTime(dt) => Ok(SqlValue::Text(dt.format(DATETIME_FORMAT).to_string())),
        Value::Date(d) => Ok(SqlValue::Text(d.format(DATE_FORMAT).to_string())),
        other => Err(ValidationError::type_mismatch(
            field,
            "text",
            other.type_name(),
        )),
    }
}

fn serialize_int(field: &str, value: &Value) -> Result<SqlValue, ValidationError> {
    match value {
        Value::Null => Ok(SqlValue::Int(0)),
        Value::Int(v) => Ok(SqlValue::Int(*v)),
        Value::Bool(v) => Ok(SqlValue::Int(i64::from(*v))),
        // Fractions are dropped, matching integer column semantics.
        Value::Float(v) => Ok(SqlValue::Int(*v as i64)),
        Value::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(SqlValue::Int(0));
            }
            trimmed
                .parse::<i64>()
                .map(SqlValue::Int)
                .map_err(|_| ValidationError::bad_number(field, s.clone()))
        }
        other => Err(ValidationError::type_mismatch(
            field,
            "number",
            other.type_name(),
        )),
    }
}

fn serialize_float(field: &str, value: &Value) -> Result<SqlValue, ValidationError> {
    match value {
        Value::Null => Ok(SqlValue::Float(0.0)),
        Value::Float(v) => Ok(SqlValue::Float(*v)),
        Value::Int(v) => Ok(SqlValue::Float(*v as f64)),
        Value::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(SqlValue::Float(0.0));
            }
            trimmed
                .parse::<f64>()
                .map(SqlValue::Float)
                .map_err(|_| ValidationError::bad_number(field, s.clone()))
        }
        other => Err(ValidationError::type_mismatch(
            field,
            "float",
            other.type_name(),
        )),
    }
}

fn serialize_bool(field: &str, value: &Value) -> Result<SqlValue, ValidationError> {
    match value {
        Value::Null => Ok(SqlValue::Int(0)),
        Value::Bool(v) => Ok(SqlValue::Int(i64::from(*v))),
        Value::Int(v) => Ok(SqlValue::Int(i64::from(*v != 0))),
        Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(SqlValue::Int(1)),
            "false" | "0" | "" => Ok(SqlValue::Int(0)),
            _ => Err(ValidationError::bad_bool(field, s.clone())),
        },
        other => Err(ValidationError::type_mismatch(
            field,
            "bool",
            other.type_name(),
        )),
    }
}

fn serialize_date(field: &str, value: &Value) -> Result<SqlValue, ValidationError> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Date(d) => Ok(SqlValue::Text(d.format(DATE_FORMAT).to_string())),
        Value::DateTime(dt) => Ok(SqlValue::Text(dt.date().format(DATE_FORMAT).to_string())),
        Value::Text(s) => match parse_date(s) {
            Some(d) => Ok(SqlValue::Text(d.format(DATE_FORMAT).to_string())),
            None => Err(ValidationError::bad_date(field, s.clone())),
        },
        other => Err(ValidationError::type_mismatch(
            field,
            "date",
            other.type_name(),
        )),
    }
}

fn serialize_datetime(field: &str, value: &Value) -> Result<SqlValue, ValidationError> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::DateTime(dt) => Ok(SqlValue::Text(dt.format(DATETIME_FORMAT).to_string())),
        Value::Date(d) => Ok(SqlValue::Text(
            d.and_time(NaiveTime::MIN).format(DATETIME_FORMAT).to_string(),
        )),
        Value::Text(s) => match parse_datetime(s) {
            Some(dt) => Ok(SqlValue::Text(dt.format(DATETIME_FORMAT).to_string())),
            None => Err(ValidationError::bad_date(field, s.clone())),
        },
        other => Err(ValidationError::type_mismatch(
            field,
            "datetime",
            other.type_name(),
        )),
    }
}

fn serialize_multilist(field: &str, value: &Value) -> Result<SqlValue, ValidationError> {
    match value {
        Value::Null => Ok(SqlValue::Text(String::new())),
        Value::List(items) => {
            if items.iter().any(|i| i.contains(MULTIVALUE_DELIMITER)) {
                return Err(ValidationError::delimiter_collision(field));
            }
            Ok(SqlValue::Text(join_multi(items)))
        }
        // A single string is accepted as a one-element selection.
        Value::Text(s) => {
            if s.contains(MULTIVALUE_DELIMITER) {
                // Already joined storage form; keep it.
                Ok(SqlValue::Text(s.clone()))
            } else if s.is_empty() {
                Ok(SqlValue::Text(String::new()))
            } else {
                Ok(SqlValue::Text(s.clone()))
            }
        }
        other => Err(ValidationError::type_mismatch(
            field,
            "multilist",
            other.type_name(),
        )),
    }
}

fn serialize_unitlist(field: &str, value: &Value) -> Result<SqlValue, ValidationError> {
    match value {
        Value::Null => Ok(SqlValue::Text(String::new())),
        Value::Refs(ids) => Ok(SqlValue::Text(
            ids.iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join("\n"),
        )),
        Value::Int(id) => Ok(SqlValue::Text(id.to_string())),
        Value::List(items) => {
            let mut ids = Vec::with_capacity(items.len());
            for item in items {
                let trimmed = item.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let id = trimmed
                    .parse::<i64>()
                    .map_err(|_| ValidationError::bad_number(field, item.clone()))?;
                ids.push(id.to_string());
            }
            Ok(SqlValue::Text(ids.join("\n")))
        }
        Value::Text(s) => {
            let mut ids = Vec::new();
            for item in split_multi(s) {
                let trimmed = item.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let id = trimmed
                    .parse::<i64>()
                    .map_err(|_| ValidationError::bad_number(field, item.clone()))?;
                ids.push(id.to_string());
            }
            Ok(SqlValue::Text(ids.join("\n")))
        }
        other => Err(ValidationError::type_mismatch(
            field,
            "unitlist",
            other.type_name(),
        )),
    }
}

fn serialize_json(field: &str, value: &Value) -> Result<SqlValue, ValidationError> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Json(v) => serde_json::to_string(v)
            .map(SqlValue::Text)
            .map_err(|e| ValidationError::bad_json(field, e.to_string())),
        // Text input is validated and re-encoded canonically.
        Value::Text(s) => {
            if s.is_empty() {
                return Ok(SqlValue::Null);
            }
            let parsed: serde_json::Value = serde_json::from_str(s)
                .map_err(|e| ValidationError::bad_json(field, e.to_string()))?;
            serde_json::to_string(&parsed)
                .map(SqlValue::Text)
                .map_err(|e| ValidationError::bad_json(field, e.to_string()))
        }
        other => Err(ValidationError::type_mismatch(
            field,
            "json",
            other.type_name(),
        )),
    }
}

fn serialize_file(field: &str, value: &Value) -> Result<SqlValue, ValidationError> {
    match value {
        Value::Null => Ok(SqlValue::Text(String::new())),
        Value::Text(s) => Ok(SqlValue::Text(s.clone())),
        other => Err(ValidationError::type_mismatch(
            field,
            "file key",
            other.type_name(),
        )),
    }
}

fn join_multi(items: &[String]) -> String {
    items.join("\n")
}

fn split_multi(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    text.split(MULTIVALUE_DELIMITER)
        .map(str::to_string)
        .collect()
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(trimmed, DATETIME_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(trimmed, DATETIME_FORMAT)
                .ok()
                .map(|dt| dt.date())
        })
}

fn text_of(value: SqlValue) -> String {
    match value {
        SqlValue::Null => String::new(),
        SqlValue::Text(s) => s,
        SqlValue::Int(v) => v.to_string(),
        SqlValue::Float(v) => v.to_string(),
        SqlValue::Blob(_) => String::new(),
    }
}

fn int_of(value: SqlValue) -> i64 {
    match value {
        SqlValue::Int(v) => v,
        SqlValue::Float(v) => v as i64,
        SqlValue::Text(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn float_of(value: SqlValue) -> f64 {
    match value {
        SqlValue::Float(v) => v,
        SqlValue::Int(v) => v as f64,
        SqlValue::Text(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn bool_of(value: SqlValue) -> bool {
    match value {
        SqlValue::Int(v) => v != 0,
        SqlValue::Float(v) => v != 0.0,
        SqlValue::Text(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        _ => false,
    }
}

fn datetime_of(value: &SqlValue) -> Option<NaiveDateTime> {
    match value {
        SqlValue::Text(s) => parse_datetime(s),
        _ => None,
    }
}

fn date_of(value: &SqlValue) -> Option<NaiveDate> {
    match value {
        SqlValue::Text(s) => parse_date(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn roundtrip(datatype: Datatype, value: Value) -> Value {
        let stored = serialize_value(datatype, "f", &value).unwrap();
        deserialize_value(datatype, stored)
    }

    #[test]
    fn text_roundtrip() {
        assert_eq!(
            roundtrip(Datatype::Text, Value::from("hello world")),
            Value::from("hello world")
        );
        assert_eq!(roundtrip(Datatype::String, Value::from("")), Value::from(""));
        // Null normalizes to the empty string for text columns.
        assert_eq!(roundtrip(Datatype::Text, Value::Null), Value::from(""));
    }

    #[test]
    fn number_roundtrip() {
        assert_eq!(roundtrip(Datatype::Number, Value::from(0i64)), Value::from(0i64));
        assert_eq!(
            roundtrip(Datatype::Number, Value::from(-12345i64)),
            Value::from(-12345i64)
        );
        assert_eq!(
            roundtrip(Datatype::Number, Value::from(i64::MAX)),
            Value::from(i64::MAX)
        );
        // Numeric strings are coerced once and stay numeric.
        assert_eq!(roundtrip(Datatype::Number, Value::from("42")), Value::from(42i64));
    }

    #[test]
    fn number_rejects_garbage() {
        let err = serialize_value(Datatype::Number, "rating", &Value::from("abc")).unwrap_err();
        assert!(matches!(err, ValidationError::BadNumber { .. }));

        let err = serialize_value(Datatype::Number, "rating", &Value::List(vec![])).unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { .. }));
    }

    #[test]
    fn float_roundtrip() {
        assert_eq!(
            roundtrip(Datatype::Float, Value::from(3.25)),
            Value::from(3.25)
        );
        assert_eq!(roundtrip(Datatype::Float, Value::from(-0.5)), Value::from(-0.5));
        assert_eq!(roundtrip(Datatype::Float, Value::Null), Value::from(0.0));
    }

    #[test]
    fn bool_roundtrip() {
        assert_eq!(roundtrip(Datatype::Bool, Value::from(true)), Value::from(true));
        assert_eq!(roundtrip(Datatype::Bool, Value::from(false)), Value::from(false));
        assert_eq!(roundtrip(Datatype::Bool, Value::from("TRUE")), Value::from(true));
        assert_eq!(roundtrip(Datatype::Bool, Value::from("0")), Value::from(false));

        let stored = serialize_value(Datatype::Bool, "f", &Value::from(true)).unwrap();
        assert_eq!(stored, SqlValue::Int(1));
    }

    #[test]
    fn bool_rejects_garbage() {
        let err = serialize_value(Datatype::Bool, "flag", &Value::from("maybe")).unwrap_err();
        assert!(matches!(err, ValidationError::BadBool { .. }));
    }

    #[test]
    fn datetime_roundtrip() {
        let dt = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_opt(13, 45, 9)
            .unwrap();
        assert_eq!(
            roundtrip(Datatype::Datetime, Value::DateTime(dt)),
            Value::DateTime(dt)
        );

        // Far-future date.
        let far = NaiveDate::from_ymd_opt(9999, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();
        assert_eq!(
            roundtrip(Datatype::Timestamp, Value::DateTime(far)),
            Value::DateTime(far)
        );

        // Absent deserializes to the no-value sentinel, not an error.
        assert_eq!(deserialize_value(Datatype::Datetime, SqlValue::Null), Value::Null);
        assert_eq!(
            deserialize_value(Datatype::Datetime, SqlValue::Text("garbage".into())),
            Value::Null
        );
    }

    #[test]
    fn date_roundtrip() {
        let d = NaiveDate::from_ymd_opt(1999, 1, 2).unwrap();
        assert_eq!(roundtrip(Datatype::Date, Value::Date(d)), Value::Date(d));
        // A datetime assigned to a date column keeps the date part.
        let dt = d.and_hms_opt(10, 0, 0).unwrap();
        assert_eq!(roundtrip(Datatype::Date, Value::DateTime(dt)), Value::Date(d));
    }

    #[test]
    fn date_rejects_garbage() {
        let err = serialize_value(Datatype::Date, "published", &Value::from("not a date"))
            .unwrap_err();
        assert!(matches!(err, ValidationError::BadDate { .. }));
    }

    #[test]
    fn multilist_roundtrip() {
        let items = vec!["red".to_string(), "green".to_string(), "blue".to_string()];
        assert_eq!(
            roundtrip(Datatype::Multilist, Value::List(items.clone())),
            Value::List(items)
        );

        // Empty list and absent input both come back as the empty sequence.
        assert_eq!(
            roundtrip(Datatype::Multilist, Value::List(vec![])),
            Value::List(vec![])
        );
        assert_eq!(
            deserialize_value(Datatype::Multilist, SqlValue::Null),
            Value::List(vec![])
        );
        assert_eq!(
            deserialize_value(Datatype::Multilist, SqlValue::Text(String::new())),
            Value::List(vec![])
        );
    }

    #[test]
    fn multilist_storage_form() {
        let stored = serialize_value(
            Datatype::Multilist,
            "tags",
            &Value::List(vec!["a".into(), "b".into()]),
        )
        .unwrap();
        assert_eq!(stored, SqlValue::Text("a\nb".into()));
    }

    #[test]
    fn multilist_rejects_delimiter_in_item() {
        let err = serialize_value(
            Datatype::Multilist,
            "tags",
            &Value::List(vec!["bad\nitem".into()]),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::DelimiterCollision { .. }));
    }

    #[test]
    fn unitlist_roundtrip() {
        let ids = vec![3i64, 17, 12000];
        assert_eq!(
            roundtrip(Datatype::Unitlist, Value::Refs(ids.clone())),
            Value::Refs(ids)
        );
        assert_eq!(
            roundtrip(Datatype::Unitlist, Value::Refs(vec![])),
            Value::Refs(vec![])
        );
        // Numeric strings are accepted.
        assert_eq!(
            roundtrip(Datatype::Unitlist, Value::from("5\n6")),
            Value::Refs(vec![5, 6])
        );
        let err = serialize_value(Datatype::Unitlist, "refs", &Value::from("5\nx")).unwrap_err();
        assert!(matches!(err, ValidationError::BadNumber { .. }));
    }

    #[test]
    fn unit_roundtrip() {
        assert_eq!(roundtrip(Datatype::Unit, Value::from(99i64)), Value::from(99i64));
        assert_eq!(roundtrip(Datatype::Unit, Value::Null), Value::from(0i64));
    }

    #[test]
    fn json_roundtrip() {
        let v = serde_json::json!({
            "name": "deep",
            "nested": {"list": [1, 2, {"three": [null, true]}]},
        });
        assert_eq!(
            roundtrip(Datatype::Json, Value::Json(v.clone())),
            Value::Json(v)
        );

        // Absent value is the explicit no-value sentinel.
        assert_eq!(deserialize_value(Datatype::Json, SqlValue::Null), Value::Null);
        assert_eq!(roundtrip(Datatype::Json, Value::Null), Value::Null);
    }

    #[test]
    fn json_text_is_validated() {
        let stored = serialize_value(Datatype::Json, "meta", &Value::from("{\"a\": 1}")).unwrap();
        assert_eq!(stored, SqlValue::Text("{\"a\":1}".into()));

        let err = serialize_value(Datatype::Json, "meta", &Value::from("{broken")).unwrap_err();
        assert!(matches!(err, ValidationError::BadJson { .. }));
    }

    #[test]
    fn blob_passes_through() {
        assert_eq!(
            deserialize_value(Datatype::Text, SqlValue::Blob(vec![1, 2, 3])),
            Value::Binary(vec![1, 2, 3])
        );
    }

    #[test]
    fn same_datatype_same_behavior_across_tables() {
        // The conversion only depends on the datatype, not the table, so a
        // field typed the same way serializes identically everywhere.
        let a = serialize_value(Datatype::Number, "pool_sort", &Value::from(7i64)).unwrap();
        let b = serialize_value(Datatype::Number, "rating", &Value::from(7i64)).unwrap();
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn prop_number_roundtrip(v in any::<i64>()) {
            prop_assert_eq!(roundtrip(Datatype::Number, Value::Int(v)), Value::Int(v));
        }

        #[test]
        fn prop_text_roundtrip(s in "\\PC*") {
            prop_assert_eq!(roundtrip(Datatype::Text, Value::Text(s.clone())), Value::Text(s));
        }

        #[test]
        fn prop_float_roundtrip(v in -1.0e15f64..1.0e15) {
            prop_assert_eq!(roundtrip(Datatype::Float, Value::Float(v)), Value::Float(v));
        }

        #[test]
        fn prop_multilist_roundtrip(items in prop::collection::vec("[^\\n]*", 0..8)) {
            // Join/split cannot distinguish a trailing empty item, so filter
            // the genuinely ambiguous shape: lists containing empty strings.
            prop_assume!(items.iter().all(|i| !i.is_empty()));
            let v = Value::List(items.clone());
            prop_assert_eq!(roundtrip(Datatype::Multilist, v), Value::List(items));
        }

        #[test]
        fn prop_unitlist_roundtrip(ids in prop::collection::vec(any::<i64>(), 0..8)) {
            prop_assert_eq!(
                roundtrip(Datatype::Unitlist, Value::Refs(ids.clone())),
                Value::Refs(ids)
            );
        }

        #[test]
        fn prop_datetime_roundtrip(
            year in 1970i32..3000,
            month in 1u32..=12,
            day in 1u32..=28,
            hour in 0u32..24,
            min in 0u32..60,
            sec in 0u32..60,
        ) {
            let dt = NaiveDate::from_ymd_opt(year, month, day)
                .unwrap()
                .and_hms_opt(hour, min, sec)
                .unwrap();
            prop_assert_eq!(
                roundtrip(Datatype::Datetime, Value::DateTime(dt)),
                Value::DateTime(dt)
            );
        }
    }
}
