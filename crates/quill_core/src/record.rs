//! Log record encoding.
//!
//! The datafile holds one JSON record per line: a full document (the
//! current state for its `_id`), a `$$deleted` tombstone, or an index
//! lifecycle record (`$$indexCreated` / `$$indexRemoved`).

use crate::error::{CoreError, CoreResult};
use crate::index::{IndexOptions, SharedDoc};
use quill_codec::{deserialize, serialize, Value};
use std::sync::Arc;

const DELETED_TAG: &str = "$$deleted";
const INDEX_CREATED_TAG: &str = "$$indexCreated";
const INDEX_REMOVED_TAG: &str = "$$indexRemoved";

/// A single datafile record.
#[derive(Debug, Clone)]
pub enum LogRecord {
    /// Current state of a document.
    Doc(SharedDoc),
    /// Tombstone: the document with this `_id` is gone.
    Deleted(String),
    /// A secondary index was declared.
    IndexCreated(IndexOptions),
    /// A secondary index was dropped.
    IndexRemoved(String),
}

impl LogRecord {
    /// Encodes the record as a log line (without trailing newline).
    pub fn encode(&self) -> CoreResult<String> {
        let value = match self {
            LogRecord::Doc(doc) => return Ok(serialize(doc)?),
            LogRecord::Deleted(id) => Value::object(vec![
                (DELETED_TAG, Value::Bool(true)),
                ("_id", Value::from(id.as_str())),
            ]),
            LogRecord::IndexCreated(options) => {
                let mut declaration = vec![
                    ("fieldName", Value::from(options.field_name.as_str())),
                    ("unique", Value::Bool(options.unique)),
                    ("sparse", Value::Bool(options.sparse)),
                ];
                if let Some(seconds) = options.expire_after_seconds {
                    declaration.push(("expireAfterSeconds", Value::Number(seconds as f64)));
                }
                Value::object(vec![(INDEX_CREATED_TAG, Value::object(declaration))])
            }
            LogRecord::IndexRemoved(field) => {
                Value::object(vec![(INDEX_REMOVED_TAG, Value::from(field.as_str()))])
            }
        };
        Ok(serialize(&value)?)
    }

    /// Decodes a log line.
    ///
    /// # Errors
    ///
    /// Any malformed line fails; the persistence layer counts those
    /// against the corruption threshold.
    pub fn decode(line: &str) -> CoreResult<LogRecord> {
        let value = deserialize(line)?;
        let map = value
            .as_object()
            .ok_or_else(|| CoreError::invalid_query("log record is not an object"))?;

        if map.get(DELETED_TAG).and_then(Value::as_bool) == Some(true) {
            let id = map
                .get("_id")
                .and_then(Value::as_str)
                .ok_or_else(|| CoreError::invalid_query("tombstone without _id"))?;
            return Ok(LogRecord::Deleted(id.to_string()));
        }

        if let Some(declaration) = map.get(INDEX_CREATED_TAG) {
            let field_name = declaration
                .get("fieldName")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    CoreError::invalid_query("index declaration without fieldName")
                })?;
            let mut options = IndexOptions::new(field_name)
                .unique(declaration.get("unique").and_then(Value::as_bool).unwrap_or(false))
                .sparse(declaration.get("sparse").and_then(Value::as_bool).unwrap_or(false));
            if let Some(seconds) = declaration
                .get("expireAfterSeconds")
                .and_then(Value::as_number)
            {
                options = options.expire_after_seconds(seconds as i64);
            }
            return Ok(LogRecord::IndexCreated(options));
        }

        if let Some(field) = map.get(INDEX_REMOVED_TAG) {
            let field = field
                .as_str()
                .ok_or_else(|| CoreError::invalid_query("index removal without field"))?;
            return Ok(LogRecord::IndexRemoved(field.to_string()));
        }

        if map.get("_id").and_then(Value::as_str).is_none() {
            return Err(CoreError::invalid_query("document record without _id"));
        }
        Ok(LogRecord::Doc(Arc::new(value)))
    }
}
