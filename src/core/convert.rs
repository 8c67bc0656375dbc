//! Conversions between nanokv's `Value` tree and `rusqlite`'s parameter /
//! row types, used by the direct-SQL façade (`sql_insert`, `query`, ...).

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Row;
use serde_json::Value as Json;

use crate::error::{Error, Result};
use crate::value::Value;

/// Converts a JSON scalar into a `rusqlite` bound parameter.
///
/// Arrays and objects are stored as their JSON text representation, since
/// SQLite has no native tree type; scalars map onto SQLite's native types.
pub fn json_to_sql(value: &Json) -> SqlValue {
    match value {
        Json::Null => SqlValue::Null,
        Json::Bool(b) => SqlValue::Integer(if *b { 1 } else { 0 }),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                SqlValue::Real(f)
            } else {
                SqlValue::Null
            }
        }
        Json::String(s) => SqlValue::Text(s.clone()),
        Json::Array(_) | Json::Object(_) => {
            SqlValue::Text(serde_json::to_string(value).unwrap_or_default())
        }
    }
}

/// Converts a `Value` into a bound SQL parameter (see [`json_to_sql`]).
pub fn value_to_sql(value: &Value) -> SqlValue {
    json_to_sql(&value.0)
}

/// Converts one SQLite column into a JSON value, for building `query`
/// result rows (`Vec<dict>`).
pub fn sql_to_json(value_ref: ValueRef<'_>) -> Json {
    match value_ref {
        ValueRef::Null => Json::Null,
        ValueRef::Integer(i) => Json::from(i),
        ValueRef::Real(f) => Json::from(f),
        ValueRef::Text(t) => Json::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Json::String(base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            b,
        )),
    }
}

/// Builds a JSON object (`{column: value, ...}`) from one result row, using
/// `column_names` for keys in order.
pub fn row_to_object(row: &Row<'_>, column_names: &[String]) -> Result<Value> {
    let mut map = serde_json::Map::new();
    for (i, name) in column_names.iter().enumerate() {
        let value_ref = row
            .get_ref(i)
            .map_err(|e| Error::Type(format!("reading column {i}: {e}")))?;
        map.insert(name.clone(), sql_to_json(value_ref));
    }
    Ok(Value(Json::Object(map)))
}
