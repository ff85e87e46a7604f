//! Parsed query AST.

use crate::error::{CoreError, CoreResult};
use quill_codec::Value;
use regex::Regex;

/// A parsed query.
#[derive(Debug, Clone)]
pub enum Query {
    /// Conjunction; the empty conjunction matches everything.
    And(Vec<Query>),
    /// Disjunction; the empty disjunction matches nothing.
    Or(Vec<Query>),
    /// Negation.
    Not(Box<Query>),
    /// A predicate over one dotted field.
    Field(FieldClause),
}

/// All operators applied to one field; multiple operators are
/// conjunctive and must hold on the same fanned-out element.
#[derive(Debug, Clone)]
pub struct FieldClause {
    /// Dotted path of the field.
    pub path: String,
    /// Operators to satisfy.
    pub ops: Vec<FieldOp>,
}

/// A single field operator.
#[derive(Debug, Clone)]
pub enum FieldOp {
    /// Equality under the value comparator.
    Eq(Value),
    /// Negated equality; matches absent fields.
    Ne(Value),
    /// Strictly less than (same-type comparison only).
    Lt(Value),
    /// Less than or equal.
    Lte(Value),
    /// Strictly greater than.
    Gt(Value),
    /// Greater than or equal.
    Gte(Value),
    /// Membership in a list of values.
    In(Vec<Value>),
    /// Non-membership; matches absent fields.
    Nin(Vec<Value>),
    /// Field presence.
    Exists(bool),
    /// Regular-expression match on string values.
    Regex(Regex),
    /// Array length equality.
    Size(usize),
    /// Recursive match against array elements.
    ElemMatch(Box<Query>),
}

/// Parses a raw query mapping into an AST.
///
/// # Errors
///
/// Fails with [`CoreError::UnknownOperator`] on an unrecognized `$`
/// operator and [`CoreError::InvalidQuery`] on shape errors.
pub fn parse_query(query: &Value) -> CoreResult<Query> {
    let map = query
        .as_object()
        .ok_or_else(|| CoreError::invalid_query("query must be an object"))?;

    let mut clauses = Vec::with_capacity(map.len());
    for (key, value) in map {
        if key.starts_with('$') {
            clauses.push(parse_logical(key, value)?);
        } else {
            clauses.push(Query::Field(parse_field_clause(key, value)?));
        }
    }
    Ok(Query::And(clauses))
}

fn parse_logical(key: &str, value: &Value) -> CoreResult<Query> {
    match key {
        "$and" | "$or" => {
            let items = value.as_array().ok_or_else(|| {
                CoreError::invalid_query(format!("{key} operand must be an array"))
            })?;
            let parsed: Vec<Query> =
                items.iter().map(parse_query).collect::<CoreResult<_>>()?;
            Ok(if key == "$and" {
                Query::And(parsed)
            } else {
                Query::Or(parsed)
            })
        }
        "$not" => Ok(Query::Not(Box::new(parse_query(value)?))),
        _ => Err(CoreError::unknown_operator(key)),
    }
}

fn parse_field_clause(path: &str, spec: &Value) -> CoreResult<FieldClause> {
    if let Some(map) = spec.as_object() {
        let with_operator = map.keys().filter(|k| k.starts_with('$')).count();
        if with_operator > 0 {
            if with_operator != map.len() {
                return Err(CoreError::invalid_query(format!(
                    "field {path:?} mixes operators and plain values"
                )));
            }
            return Ok(FieldClause {
                path: path.to_string(),
                ops: parse_field_ops(spec)?,
            });
        }
    }

    Ok(FieldClause {
        path: path.to_string(),
        ops: vec![FieldOp::Eq(spec.clone())],
    })
}

/// Parses an all-operator mapping (`{$gt: 5, $lt: 10}`) into field ops.
///
/// Also used by `$pull`, whose operand may carry the same operators.
pub fn parse_field_ops(spec: &Value) -> CoreResult<Vec<FieldOp>> {
    let map = spec
        .as_object()
        .ok_or_else(|| CoreError::invalid_query("operator spec must be an object"))?;

    let mut ops = Vec::with_capacity(map.len());
    for (key, operand) in map {
        let op = match key.as_str() {
            "$eq" => FieldOp::Eq(operand.clone()),
            "$ne" => FieldOp::Ne(operand.clone()),
            "$lt" => FieldOp::Lt(operand.clone()),
            "$lte" => FieldOp::Lte(operand.clone()),
            "$gt" => FieldOp::Gt(operand.clone()),
            "$gte" => FieldOp::Gte(operand.clone()),
            "$in" => FieldOp::In(require_array(key, operand)?),
            "$nin" => FieldOp::Nin(require_array(key, operand)?),
            "$exists" => FieldOp::Exists(operand.as_bool().ok_or_else(|| {
                CoreError::invalid_query("$exists operand must be a boolean")
            })?),
            "$regex" => {
                let pattern = operand.as_str().ok_or_else(|| {
                    CoreError::invalid_query("$regex operand must be a string")
                })?;
                FieldOp::Regex(Regex::new(pattern).map_err(|e| {
                    CoreError::invalid_query(format!("bad $regex pattern: {e}"))
                })?)
            }
            "$size" => {
                let n = operand.as_number().filter(|n| *n >= 0.0 && n.fract() == 0.0);
                FieldOp::Size(n.ok_or_else(|| {
                    CoreError::invalid_query("$size operand must be a non-negative integer")
                })? as usize)
            }
            "$elemMatch" => FieldOp::ElemMatch(Box::new(parse_query(operand)?)),
            other => return Err(CoreError::unknown_operator(other)),
        };
        ops.push(op);
    }
    Ok(ops)
}

fn require_array(op: &str, operand: &Value) -> CoreResult<Vec<Value>> {
    operand
        .as_array()
        .map(<[Value]>::to_vec)
        .ok_or_else(|| CoreError::invalid_query(format!("{op} operand must be an array")))
}
