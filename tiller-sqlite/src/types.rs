//! Converting SQLite rows to JSON objects.

use rusqlite::types::ValueRef;
use serde_json::{Map, Value as JsonValue};

/// Convert a SQLite value to JSON.
///
/// Text stays text. Blobs that are not UTF-8 become lowercase hex.
pub fn from_sqlite_value(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(i) => JsonValue::Number(i.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ValueRef::Text(bytes) => JsonValue::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => JsonValue::String(s.to_string()),
            Err(_) => JsonValue::String(hex::encode(bytes)),
        },
    }
}

/// Convert a row to a JSON object keyed by column name.
pub fn row_to_json(row: &rusqlite::Row<'_>, columns: &[String]) -> rusqlite::Result<JsonValue> {
    let mut map = Map::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        map.insert(column.clone(), from_sqlite_value(row.get_ref(i)?));
    }
    Ok(JsonValue::Object(map))
}
