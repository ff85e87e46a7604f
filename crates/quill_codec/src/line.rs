//! Log-line codec.
//!
//! Records are stored one JSON value per line. JSON has no timestamp
//! type, so timestamps travel as `{"$$date": <ms since epoch>}` and are
//! restored on read. Object keys serialize in sorted order, giving every
//! value a single canonical line.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use chrono::DateTime;

/// Field name tagging a serialized timestamp.
const DATE_TAG: &str = "$$date";

/// Encodes a value as a single canonical JSON line (without newline).
///
/// # Errors
///
/// Fails with [`CodecError::NonFiniteNumber`] if the tree contains a NaN
/// or infinite number.
pub fn serialize(value: &Value) -> CodecResult<String> {
    let json = to_json(value)?;
    Ok(serde_json::to_string(&json)?)
}

/// Decodes a single log line back into a value.
///
/// # Errors
///
/// Fails with [`CodecError::Json`] on malformed JSON and
/// [`CodecError::DateOutOfRange`] on an unrepresentable `$$date` payload.
pub fn deserialize(line: &str) -> CodecResult<Value> {
    let json: serde_json::Value = serde_json::from_str(line)?;
    from_json(&json)
}

fn to_json(value: &Value) -> CodecResult<serde_json::Value> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => serde_json::Value::Number(
            serde_json::Number::from_f64(*n).ok_or(CodecError::NonFiniteNumber)?,
        ),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::DateTime(dt) => {
            let mut map = serde_json::Map::new();
            map.insert(DATE_TAG.to_string(), dt.timestamp_millis().into());
            serde_json::Value::Object(map)
        }
        Value::Array(items) => serde_json::Value::Array(
            items.iter().map(to_json).collect::<CodecResult<_>>()?,
        ),
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (key, item) in map {
                out.insert(key.clone(), to_json(item)?);
            }
            serde_json::Value::Object(out)
        }
    })
}

fn from_json(json: &serde_json::Value) -> CodecResult<Value> {
    Ok(match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            Value::Number(n.as_f64().ok_or(CodecError::NonFiniteNumber)?)
        }
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(items) => {
            Value::Array(items.iter().map(from_json).collect::<CodecResult<_>>()?)
        }
        serde_json::Value::Object(map) => {
            if map.len() == 1 {
                if let Some(ms) = map.get(DATE_TAG).and_then(serde_json::Value::as_f64) {
                    let millis = ms as i64;
                    let dt = DateTime::from_timestamp_millis(millis)
                        .ok_or(CodecError::DateOutOfRange { millis })?;
                    return Ok(Value::DateTime(dt));
                }
            }
            let mut out = std::collections::BTreeMap::new();
            for (key, item) in map {
                out.insert(key.clone(), from_json(item)?);
            }
            Value::Object(out)
        }
    })
}
