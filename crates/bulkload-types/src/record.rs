//! Raw input records

use serde_json::{Map, Value};

/// One input row: field name to raw value
///
/// Values are scalars, nested objects (used for association lookups) or
/// arrays of either.
pub type Record = Map<String, Value>;

/// Whether a raw value counts as "not provided"
///
/// Null, whitespace-only strings, empty arrays and objects, and `false` are blank.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Number(_) => false,
    }
}

/// Whether a value should be assigned as an attribute
///
/// Blank values are skipped, except `false` which is an explicit value.
pub fn is_assignable(value: &Value) -> bool {
    !is_blank(value) || matches!(value, Value::Bool(false))
}

/// Render a raw value for messages (strings without quotes)
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
