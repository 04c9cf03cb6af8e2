//! Conversion utilities between MySQL rows and JSON.
//!
//! Result rows are rendered as fixed-arity JSON arrays ("tuples") in column
//! order, so the default select yields `[exam_id, patient_name, age,
//! result]`. Also provides the JSON argument helpers used by tool dispatch.

use serde_json::{json, Map, Value as JsonValue};
use sqlx::mysql::MySqlRow;
use sqlx::Row;

use crate::error::{McpError, Result};

/// Convert result rows to a JSON array of tuples.
pub fn rows_to_tuples(rows: &[MySqlRow]) -> JsonValue {
    JsonValue::Array(rows.iter().map(row_to_tuple).collect())
}

fn row_to_tuple(row: &MySqlRow) -> JsonValue {
    let arity = row.columns().len();
    let mut values = Vec::with_capacity(arity);
    for index in 0..arity {
        values.push(column_to_json(row, index));
    }
    JsonValue::Array(values)
}

/// Decode one column by trying the types the exam schema can produce, widest
/// first. Caller-chosen projections may carry other types; anything
/// undecodable degrades to a lossy string or null rather than failing the
/// whole row.
fn column_to_json(row: &MySqlRow, index: usize) -> JsonValue {
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map_or(JsonValue::Null, |v| json!(v));
    }
    if let Ok(v) = row.try_get::<Option<u64>, _>(index) {
        return v.map_or(JsonValue::Null, |v| json!(v));
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map_or(JsonValue::Null, |v| json!(v));
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map_or(JsonValue::Null, JsonValue::String);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return v.map_or(JsonValue::Null, |bytes| {
            JsonValue::String(String::from_utf8_lossy(&bytes).into_owned())
        });
    }
    JsonValue::Null
}

/// Helper to get a required string argument from JSON arguments.
pub fn get_string_arg(args: &Map<String, JsonValue>, name: &str) -> Result<String> {
    args.get(name)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| McpError::MissingArg(name.to_string()))
}

/// Helper to get an optional string argument from JSON arguments.
pub fn get_optional_string(args: &Map<String, JsonValue>, name: &str) -> Option<String> {
    args.get(name).and_then(|v| v.as_str()).map(|s| s.to_string())
}
