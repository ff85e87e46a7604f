//! Dotted-path access into document values.
//!
//! A dotted path is a `.`-separated chain of field names; a segment that
//! parses as an integer indexes into an array. Traversing an array with a
//! non-integer segment fans out: the remaining path is mapped over every
//! element and the values found are collected into an array.

use crate::value::Value;

/// Reads the value at `path`, or `None` if the path is absent.
pub fn get_dot_value(value: &Value, path: &str) -> Option<Value> {
    let segments: Vec<&str> = path.split('.').collect();
    get_segments(value, &segments)
}

fn get_segments(value: &Value, segments: &[&str]) -> Option<Value> {
    let Some((head, rest)) = segments.split_first() else {
        return Some(value.clone());
    };

    match value {
        Value::Object(map) => map.get(*head).and_then(|v| get_segments(v, rest)),
        Value::Array(items) => {
            if let Ok(index) = head.parse::<usize>() {
                items.get(index).and_then(|v| get_segments(v, rest))
            } else {
                // Fan out over elements with the full remaining path.
                let collected: Vec<Value> = items
                    .iter()
                    .filter_map(|item| get_segments(item, segments))
                    .collect();
                Some(Value::Array(collected))
            }
        }
        _ => None,
    }
}

/// Writes `new_value` at `path`, creating intermediate objects as needed.
///
/// Array segments that parse as integers index into the array, padding
/// with nulls when the index is past the end. A scalar standing where the
/// path needs a container is replaced by an empty object.
pub fn set_dot_value(value: &mut Value, path: &str, new_value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    set_segments(value, &segments, new_value);
}

fn set_segments(value: &mut Value, segments: &[&str], new_value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };

    if let Value::Array(items) = value {
        if let Ok(index) = head.parse::<usize>() {
            if index >= items.len() {
                items.resize(index + 1, Value::Null);
            }
            if rest.is_empty() {
                items[index] = new_value;
            } else {
                set_segments(&mut items[index], rest, new_value);
            }
            return;
        }
    }

    if !matches!(value, Value::Object(_)) {
        *value = Value::Object(Default::default());
    }
    let Value::Object(map) = value else {
        return;
    };

    if rest.is_empty() {
        map.insert((*head).to_string(), new_value);
    } else {
        let child = map
            .entry((*head).to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        set_segments(child, rest, new_value);
    }
}

/// Removes the value at `path`; absent paths are a no-op.
///
/// Unsetting an array element by index nulls it out rather than shifting
/// the remaining elements.
pub fn unset_dot_value(value: &mut Value, path: &str) {
    let segments: Vec<&str> = path.split('.').collect();
    unset_segments(value, &segments);
}

fn unset_segments(value: &mut Value, segments: &[&str]) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };

    match value {
        Value::Object(map) => {
            if rest.is_empty() {
                map.remove(*head);
            } else if let Some(child) = map.get_mut(*head) {
                unset_segments(child, rest);
            }
        }
        Value::Array(items) => {
            if let Ok(index) = head.parse::<usize>() {
                if let Some(item) = items.get_mut(index) {
                    if rest.is_empty() {
                        *item = Value::Null;
                    } else {
                        unset_segments(item, rest);
                    }
                }
            }
        }
        _ => {}
    }
}
