//! Dynamic document value type.

use crate::error::{CodecError, CodecResult};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Comparator override for string keys, configured per store.
pub type StringComparator = dyn Fn(&str, &str) -> Ordering + Send + Sync;

/// A dynamic document value.
///
/// This type represents any value QuillDB can store: the leaves of a
/// document tree, the document itself (an [`Value::Object`]), and the
/// values queries and update operators carry.
///
/// Numbers are `f64` and must be finite; non-finite numbers are rejected
/// at serialization time.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Finite floating-point number.
    Number(f64),
    /// Text string (UTF-8).
    String(String),
    /// Timestamp with millisecond precision.
    DateTime(DateTime<Utc>),
    /// Array of values.
    Array(Vec<Value>),
    /// Mapping from field names to values, kept in sorted key order.
    Object(BTreeMap<String, Value>),
}

/// Rank of a value's type in the cross-type total order:
/// null < number < string < boolean < timestamp < array < object.
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Bool(_) => 3,
        Value::DateTime(_) => 4,
        Value::Array(_) => 5,
        Value::Object(_) => 6,
    }
}

impl Value {
    /// Compares two values in the total order used by indexes and sorting.
    ///
    /// Types order as null < number < string < boolean < timestamp < array
    /// < object. Within a type the natural order applies; arrays compare
    /// lexicographically and objects compare by sorted keys then values.
    pub fn compare(&self, other: &Value) -> Ordering {
        self.compare_with(other, None)
    }

    /// Compares two values, overriding string order with `strings`.
    pub fn compare_with(&self, other: &Value, strings: Option<&StringComparator>) -> Ordering {
        let rank = type_rank(self).cmp(&type_rank(other));
        if rank != Ordering::Equal {
            return rank;
        }

        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (Value::String(a), Value::String(b)) => match strings {
                Some(cmp) => cmp(a, b),
                None => a.cmp(b),
            },
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => {
                for (av, bv) in a.iter().zip(b.iter()) {
                    let ord = av.compare_with(bv, strings);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Object(a), Value::Object(b)) => {
                // BTreeMap iterates in sorted key order on both sides.
                for ((ak, av), (bk, bv)) in a.iter().zip(b.iter()) {
                    let key_ord = ak.as_str().cmp(bk.as_str());
                    if key_ord != Ordering::Equal {
                        return key_ord;
                    }
                    let val_ord = av.compare_with(bv, strings);
                    if val_ord != Ordering::Equal {
                        return val_ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => Ordering::Equal,
        }
    }

    /// Structural equality under the index comparator.
    pub fn equals(&self, other: &Value) -> bool {
        self.compare(other) == Ordering::Equal
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as a number, if it is one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a string slice, if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as a timestamp, if it is one.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Get this value as an array, if it is one.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get this value as an object, if it is one.
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    /// Mutable access to this value as an object.
    pub fn as_object_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    /// Look up a field in this object value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(m) => m.get(key),
            _ => None,
        }
    }

    /// Builds an object value from key-value pairs.
    pub fn object(pairs: Vec<(&str, Value)>) -> Self {
        Value::Object(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    /// Validates every key in the value tree.
    ///
    /// # Errors
    ///
    /// Fails with [`CodecError::InvalidKey`] if any key starts with `$`
    /// or contains `.` anywhere in the tree.
    pub fn validate_keys(&self) -> CodecResult<()> {
        match self {
            Value::Object(m) => {
                for (key, value) in m {
                    if key.is_empty() || key.starts_with('$') || key.contains('.') {
                        return Err(CodecError::invalid_key(key));
                    }
                    value.validate_keys()?;
                }
                Ok(())
            }
            Value::Array(items) => {
                for item in items {
                    item.validate_keys()?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Deep copy that drops keys beginning with `$` or containing `.`.
    ///
    /// Used when promoting a query object into an upsert document: the
    /// operator clauses are stripped, the plain equality fields survive.
    pub fn stripped_clone(&self) -> Value {
        match self {
            Value::Object(m) => Value::Object(
                m.iter()
                    .filter(|(k, _)| !k.starts_with('$') && !k.contains('.'))
                    .map(|(k, v)| (k.clone(), v.stripped_clone()))
                    .collect(),
            ),
            Value::Array(items) => {
                Value::Array(items.iter().map(Value::stripped_clone).collect())
            }
            other => other.clone(),
        }
    }

    /// True for the leaf types an index can plan an exact-match lookup on.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::Null
                | Value::Bool(_)
                | Value::Number(_)
                | Value::String(_)
                | Value::DateTime(_)
        )
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Null
    }
}
