//! Update-operator engine.
//!
//! An update query either wholly replaces the document (no `$`-prefixed
//! keys) or applies modifiers. Modifiers run in a fixed order; within
//! one modifier, field order is irrelevant. The document's `_id` is
//! immutable through either path.

use crate::error::{CoreError, CoreResult};
use crate::query::ast::{parse_field_ops, parse_query};
use crate::query::matcher::{match_query, match_spec};
use quill_codec::{get_dot_value, set_dot_value, unset_dot_value, Value};
use std::cmp::Ordering;

/// An update modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    /// Sets a field.
    Set,
    /// Removes a field.
    Unset,
    /// Adds to a numeric field.
    Inc,
    /// Keeps the smaller of the current and supplied values.
    Min,
    /// Keeps the larger of the current and supplied values.
    Max,
    /// Appends to an array (supports `$each` / `$slice`).
    Push,
    /// Appends set-wise to an array (supports `$each`).
    AddToSet,
    /// Removes the first or last array element.
    Pop,
    /// Removes array elements matching a value or query.
    Pull,
    /// Moves a field to a new path.
    Rename,
}

/// Modifiers in application order. The order is part of the contract:
/// modifiers do not commute with each other.
const MODIFIER_ORDER: &[(&str, Modifier)] = &[
    ("$set", Modifier::Set),
    ("$unset", Modifier::Unset),
    ("$inc", Modifier::Inc),
    ("$min", Modifier::Min),
    ("$max", Modifier::Max),
    ("$push", Modifier::Push),
    ("$addToSet", Modifier::AddToSet),
    ("$pop", Modifier::Pop),
    ("$pull", Modifier::Pull),
    ("$rename", Modifier::Rename),
];

/// One modifier with its field → operand pairs.
#[derive(Debug, Clone)]
pub struct ModifierClause {
    /// The modifier to apply.
    pub modifier: Modifier,
    /// Dotted field paths and their operands.
    pub fields: Vec<(String, Value)>,
}

/// A parsed update query.
#[derive(Debug, Clone)]
pub enum UpdateSpec {
    /// Whole-document replacement (preserving `_id`).
    Replace(Value),
    /// Modifier application in canonical order.
    Operators(Vec<ModifierClause>),
}

impl UpdateSpec {
    /// Returns true for the modifier form.
    pub fn has_operators(&self) -> bool {
        matches!(self, UpdateSpec::Operators(_))
    }
}

/// Parses an update query.
///
/// # Errors
///
/// Fails with [`CoreError::InvalidModifier`] when modifiers and raw
/// fields are mixed, and [`CoreError::UnknownOperator`] on an
/// unrecognized modifier.
pub fn parse_update(update: &Value) -> CoreResult<UpdateSpec> {
    let map = update
        .as_object()
        .ok_or_else(|| CoreError::invalid_query("update must be an object"))?;

    let with_modifier = map.keys().filter(|k| k.starts_with('$')).count();
    if with_modifier == 0 {
        return Ok(UpdateSpec::Replace(update.clone()));
    }
    if with_modifier != map.len() {
        return Err(CoreError::invalid_modifier(
            "cannot mix modifiers and plain fields in one update",
        ));
    }

    for key in map.keys() {
        if !MODIFIER_ORDER.iter().any(|(name, _)| *name == key.as_str()) {
            return Err(CoreError::unknown_operator(key));
        }
    }

    let mut clauses = Vec::new();
    for (name, modifier) in MODIFIER_ORDER {
        let Some(operand) = map.get(*name) else { continue };
        let fields = operand
            .as_object()
            .ok_or_else(|| {
                CoreError::invalid_modifier(format!("{name} operand must be an object"))
            })?
            .iter()
            .map(|(path, arg)| (path.clone(), arg.clone()))
            .collect();
        clauses.push(ModifierClause {
            modifier: *modifier,
            fields,
        });
    }
    Ok(UpdateSpec::Operators(clauses))
}

/// Produces the updated document, leaving `doc` untouched.
///
/// # Errors
///
/// Fails with [`CoreError::InvalidModifier`] when a modifier meets an
/// incompatible value or the update tries to change `_id`, and with a
/// key-validation error if the result carries reserved keys.
pub fn apply_update(doc: &Value, spec: &UpdateSpec) -> CoreResult<Value> {
    let result = match spec {
        UpdateSpec::Replace(new_doc) => {
            let mut result = new_doc.clone();
            if let Some(old_id) = doc.get("_id") {
                if let Some(new_id) = result.get("_id") {
                    if !new_id.equals(old_id) {
                        return Err(CoreError::invalid_modifier(
                            "a document's _id cannot be changed",
                        ));
                    }
                }
                if let Some(map) = result.as_object_mut() {
                    map.insert("_id".to_string(), old_id.clone());
                }
            }
            result
        }
        UpdateSpec::Operators(clauses) => {
            let mut result = doc.clone();
            for clause in clauses {
                for (path, arg) in &clause.fields {
                    apply_modifier(&mut result, clause.modifier, path, arg)?;
                }
            }
            match (doc.get("_id"), result.get("_id")) {
                (Some(old), Some(new)) if old.equals(new) => {}
                (None, _) => {}
                _ => {
                    return Err(CoreError::invalid_modifier(
                        "a document's _id cannot be changed",
                    ))
                }
            }
            result
        }
    };

    validate_non_id_keys(&result)?;
    Ok(result)
}

/// Key validation that tolerates the engine-owned `_id` field.
fn validate_non_id_keys(doc: &Value) -> CoreResult<()> {
    if let Some(map) = doc.as_object() {
        for (key, value) in map {
            if key == "_id" {
                continue;
            }
            if key.is_empty() || key.starts_with('$') || key.contains('.') {
                return Err(quill_codec::CodecError::invalid_key(key).into());
            }
            value.validate_keys()?;
        }
    }
    Ok(())
}

fn apply_modifier(target: &mut Value, modifier: Modifier, path: &str, arg: &Value) -> CoreResult<()> {
    match modifier {
        Modifier::Set => {
            set_dot_value(target, path, arg.clone());
            Ok(())
        }
        Modifier::Unset => {
            unset_dot_value(target, path);
            Ok(())
        }
        Modifier::Inc => apply_inc(target, path, arg),
        Modifier::Min => apply_min_max(target, path, arg, Ordering::Less),
        Modifier::Max => apply_min_max(target, path, arg, Ordering::Greater),
        Modifier::Push => apply_push(target, path, arg),
        Modifier::AddToSet => apply_add_to_set(target, path, arg),
        Modifier::Pop => apply_pop(target, path, arg),
        Modifier::Pull => apply_pull(target, path, arg),
        Modifier::Rename => apply_rename(target, path, arg),
    }
}

fn apply_inc(target: &mut Value, path: &str, arg: &Value) -> CoreResult<()> {
    let delta = arg
        .as_number()
        .ok_or_else(|| CoreError::invalid_modifier("$inc operand must be a number"))?;
    match get_dot_value(target, path) {
        None => set_dot_value(target, path, Value::Number(delta)),
        Some(Value::Number(current)) => {
            set_dot_value(target, path, Value::Number(current + delta));
        }
        Some(_) => {
            return Err(CoreError::invalid_modifier(
                "$inc applied to a non-numeric field",
            ))
        }
    }
    Ok(())
}

fn apply_min_max(target: &mut Value, path: &str, arg: &Value, keep_when: Ordering) -> CoreResult<()> {
    match get_dot_value(target, path) {
        None => set_dot_value(target, path, arg.clone()),
        Some(current) => {
            if arg.compare(&current) == keep_when {
                set_dot_value(target, path, arg.clone());
            }
        }
    }
    Ok(())
}

/// Splits a push-family operand into its items and optional `$slice`.
fn parse_each(arg: &Value, op: &str, allow_slice: bool) -> CoreResult<(Vec<Value>, Option<i64>)> {
    let Some(map) = arg.as_object() else {
        return Ok((vec![arg.clone()], None));
    };
    if !map.contains_key("$each") {
        return Ok((vec![arg.clone()], None));
    }

    let mut items = None;
    let mut slice = None;
    for (key, value) in map {
        match key.as_str() {
            "$each" => {
                items = Some(value.as_array().map(<[Value]>::to_vec).ok_or_else(|| {
                    CoreError::invalid_modifier(format!("{op} $each operand must be an array"))
                })?);
            }
            "$slice" if allow_slice => {
                let n = value.as_number().filter(|n| n.fract() == 0.0).ok_or_else(
                    || CoreError::invalid_modifier("$slice operand must be an integer"),
                )?;
                slice = Some(n as i64);
            }
            other => {
                return Err(CoreError::invalid_modifier(format!(
                    "{op} does not support the {other} modifier"
                )))
            }
        }
    }
    Ok((items.unwrap_or_default(), slice))
}

fn current_array(target: &Value, path: &str, op: &str) -> CoreResult<Option<Vec<Value>>> {
    match get_dot_value(target, path) {
        None => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items)),
        Some(_) => Err(CoreError::invalid_modifier(format!(
            "{op} applied to a non-array field"
        ))),
    }
}

fn apply_push(target: &mut Value, path: &str, arg: &Value) -> CoreResult<()> {
    let (items, slice) = parse_each(arg, "$push", true)?;
    let mut array = current_array(target, path, "$push")?.unwrap_or_default();
    array.extend(items);

    if let Some(n) = slice {
        if n == 0 {
            array.clear();
        } else if n > 0 {
            array.truncate(n as usize);
        } else {
            let keep = (-n) as usize;
            if array.len() > keep {
                array.drain(..array.len() - keep);
            }
        }
    }

    set_dot_value(target, path, Value::Array(array));
    Ok(())
}

fn apply_add_to_set(target: &mut Value, path: &str, arg: &Value) -> CoreResult<()> {
    let (items, _) = parse_each(arg, "$addToSet", false)?;
    let mut array = current_array(target, path, "$addToSet")?.unwrap_or_default();
    for item in items {
        if !array.iter().any(|existing| existing.equals(&item)) {
            array.push(item);
        }
    }
    set_dot_value(target, path, Value::Array(array));
    Ok(())
}

fn apply_pop(target: &mut Value, path: &str, arg: &Value) -> CoreResult<()> {
    let direction = arg
        .as_number()
        .filter(|n| n.fract() == 0.0)
        .ok_or_else(|| CoreError::invalid_modifier("$pop operand must be an integer"))?;
    let mut array = current_array(target, path, "$pop")?
        .ok_or_else(|| CoreError::invalid_modifier("$pop applied to a missing field"))?;

    if direction > 0.0 {
        array.pop();
    } else if direction < 0.0 && !array.is_empty() {
        array.remove(0);
    }

    set_dot_value(target, path, Value::Array(array));
    Ok(())
}

fn apply_pull(target: &mut Value, path: &str, arg: &Value) -> CoreResult<()> {
    let array = current_array(target, path, "$pull")?
        .ok_or_else(|| CoreError::invalid_modifier("$pull applied to a missing field"))?;

    let retained: Vec<Value> = if let Some(map) = arg.as_object() {
        if map.keys().all(|k| k.starts_with('$')) && !map.is_empty() {
            // Operator object: pull elements satisfying every operator.
            let ops = parse_field_ops(arg)?;
            array
                .into_iter()
                .filter(|item| !match_spec(Some(item), &ops, false))
                .collect()
        } else {
            // Plain object: a query over element documents.
            let query = parse_query(arg)?;
            array
                .into_iter()
                .filter(|item| !match_query(item, &query))
                .collect()
        }
    } else {
        array.into_iter().filter(|item| !item.equals(arg)).collect()
    };

    set_dot_value(target, path, Value::Array(retained));
    Ok(())
}

fn apply_rename(target: &mut Value, path: &str, arg: &Value) -> CoreResult<()> {
    let new_path = arg
        .as_str()
        .ok_or_else(|| CoreError::invalid_modifier("$rename target must be a string"))?;
    if let Some(value) = get_dot_value(target, path) {
        unset_dot_value(target, path);
        set_dot_value(target, new_path, value);
    }
    Ok(())
}
