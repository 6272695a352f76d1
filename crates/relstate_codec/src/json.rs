//! Conversion between [`Value`] and `serde_json::Value`.
//!
//! The HTTP and document-translation layers above the store speak plain
//! JSON; these helpers are the boundary.

use crate::error::{CodecError, CodecResult};
use crate::value::{Record, Value};

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// Converts a value into JSON.
///
/// Fails only for NaN or infinite floats, which JSON cannot carry.
pub fn to_json(value: &Value) -> CodecResult<serde_json::Value> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Integer(n) => serde_json::Value::from(*n),
        Value::Float(x) => serde_json::Number::from_f64(*x)
            .map(serde_json::Value::Number)
            .ok_or(CodecError::NonFiniteFloat)?,
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(to_json).collect::<CodecResult<_>>()?)
        }
        Value::Map(map) => serde_json::Value::Object(record_to_json_map(map)?),
    })
}

fn record_to_json_map(record: &Record) -> CodecResult<serde_json::Map<String, serde_json::Value>> {
    record
        .iter()
        .map(|(k, v)| Ok((k.clone(), to_json(v)?)))
        .collect()
}

/// Converts a record into a JSON object.
pub fn record_to_json(record: &Record) -> CodecResult<serde_json::Value> {
    Ok(serde_json::Value::Object(record_to_json_map(record)?))
}

/// Converts a JSON object into a record.
pub fn record_from_json(json: serde_json::Value) -> CodecResult<Record> {
    match Value::from(json) {
        Value::Map(record) => Ok(record),
        other => Err(CodecError::expected_record(other.type_name())),
    }
}

/// Parses a JSON document into a value.
pub fn from_json_str(input: &str) -> CodecResult<Value> {
    let json: serde_json::Value = serde_json::from_str(input)?;
    Ok(Value::from(json))
}

/// Renders a value as a compact JSON string.
pub fn to_json_string(value: &Value) -> CodecResult<String> {
    Ok(serde_json::to_string(&to_json(value)?)?)
}
