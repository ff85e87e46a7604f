//! Predicate evaluation against documents.

use crate::query::ast::{FieldClause, FieldOp, Query};
use quill_codec::{get_dot_value, Value};
use std::cmp::Ordering;

/// Evaluates a parsed query against a document.
pub fn match_query(doc: &Value, query: &Query) -> bool {
    match query {
        Query::And(clauses) => clauses.iter().all(|c| match_query(doc, c)),
        Query::Or(clauses) => clauses.iter().any(|c| match_query(doc, c)),
        Query::Not(inner) => !match_query(doc, inner),
        Query::Field(clause) => match_field(doc, clause),
    }
}

fn match_field(doc: &Value, clause: &FieldClause) -> bool {
    let value = get_dot_value(doc, &clause.path);
    match_spec(value.as_ref(), &clause.ops, true)
}

/// True for operators that consume an array whole instead of fanning
/// out over its elements.
fn uses_array_ops(ops: &[FieldOp]) -> bool {
    ops.iter()
        .any(|op| matches!(op, FieldOp::Size(_) | FieldOp::ElemMatch(_)))
}

/// Evaluates every operator of a clause against one value.
///
/// An array value (unless the clause carries array-specific operators)
/// matches if some element satisfies the whole clause, or if the array
/// itself does.
pub fn match_spec(value: Option<&Value>, ops: &[FieldOp], fan_out: bool) -> bool {
    if fan_out && !uses_array_ops(ops) {
        if let Some(Value::Array(items)) = value {
            if items.iter().any(|item| match_spec(Some(item), ops, true)) {
                return true;
            }
            return match_spec(value, ops, false);
        }
    }
    ops.iter().all(|op| eval_op(value, op))
}

/// Same-type guard for ordering operators: ordering across types never
/// matches, only numbers/strings/timestamps compare against their kin.
fn comparable(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Number(_), Value::Number(_))
            | (Value::String(_), Value::String(_))
            | (Value::DateTime(_), Value::DateTime(_))
    )
}

fn ordered(value: Option<&Value>, operand: &Value, accept: &[Ordering]) -> bool {
    value.is_some_and(|v| comparable(v, operand) && accept.contains(&v.compare(operand)))
}

fn eval_op(value: Option<&Value>, op: &FieldOp) -> bool {
    match op {
        FieldOp::Eq(q) => value.is_some_and(|v| v.equals(q)),
        FieldOp::Ne(q) => !value.is_some_and(|v| v.equals(q)),
        FieldOp::Lt(q) => ordered(value, q, &[Ordering::Less]),
        FieldOp::Lte(q) => ordered(value, q, &[Ordering::Less, Ordering::Equal]),
        FieldOp::Gt(q) => ordered(value, q, &[Ordering::Greater]),
        FieldOp::Gte(q) => ordered(value, q, &[Ordering::Greater, Ordering::Equal]),
        FieldOp::In(candidates) => {
            value.is_some_and(|v| candidates.iter().any(|c| v.equals(c)))
        }
        FieldOp::Nin(candidates) => {
            !value.is_some_and(|v| candidates.iter().any(|c| v.equals(c)))
        }
        FieldOp::Exists(want) => value.is_some() == *want,
        FieldOp::Regex(re) => value.and_then(Value::as_str).is_some_and(|s| re.is_match(s)),
        FieldOp::Size(n) => value.and_then(Value::as_array).is_some_and(|a| a.len() == *n),
        FieldOp::ElemMatch(query) => value
            .and_then(Value::as_array)
            .is_some_and(|a| a.iter().any(|item| match_query(item, query))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::parse_query;

    fn matches(doc: &Value, query: Value) -> bool {
        match_query(doc, &parse_query(&query).unwrap())
    }

    fn doc() -> Value {
        Value::object(vec![
            ("name", Value::from("mars")),
            ("order", Value::Number(4.0)),
            ("inhabited", Value::Bool(false)),
            ("tags", Value::from(vec!["red", "rocky"])),
            (
                "moons",
                Value::Array(vec![
                    Value::object(vec![
                        ("name", Value::from("phobos")),
                        ("radius", Value::Number(11.0)),
                    ]),
                    Value::object(vec![
                        ("name", Value::from("deimos")),
                        ("radius", Value::Number(6.0)),
                    ]),
                ]),
            ),
        ])
    }

    #[test]
    fn equality_on_fields() {
        assert!(matches(&doc(), Value::object(vec![("name", Value::from("mars"))])));
        assert!(!matches(&doc(), Value::object(vec![("name", Value::from("venus"))])));
        assert!(matches(&doc(), Value::object(vec![])));
    }

    #[test]
    fn comparison_operators() {
        let q = |op: &str, n: f64| {
            Value::object(vec![("order", Value::object(vec![(op, Value::Number(n))]))])
        };
        assert!(matches(&doc(), q("$gt", 3.0)));
        assert!(!matches(&doc(), q("$gt", 4.0)));
        assert!(matches(&doc(), q("$gte", 4.0)));
        assert!(matches(&doc(), q("$lt", 5.0)));
        assert!(matches(&doc(), q("$lte", 4.0)));
        assert!(matches(&doc(), q("$ne", 5.0)));
    }

    #[test]
    fn ordering_across_types_never_matches() {
        let q = Value::object(vec![(
            "name",
            Value::object(vec![("$gt", Value::Number(0.0))]),
        )]);
        assert!(!matches(&doc(), q));
    }

    #[test]
    fn ne_matches_missing_field() {
        let q = Value::object(vec![(
            "absent",
            Value::object(vec![("$ne", Value::from("x"))]),
        )]);
        assert!(matches(&doc(), q));
    }

    #[test]
    fn in_and_nin() {
        let q = Value::object(vec![(
            "name",
            Value::object(vec![(
                "$in",
                Value::from(vec!["earth", "mars"]),
            )]),
        )]);
        assert!(matches(&doc(), q));

        let q = Value::object(vec![(
            "name",
            Value::object(vec![("$nin", Value::from(vec!["earth"]))]),
        )]);
        assert!(matches(&doc(), q));
    }

    #[test]
    fn exists_operator() {
        let exists = |field: &str, want: bool| {
            Value::object(vec![(field, Value::object(vec![("$exists", Value::Bool(want))]))])
        };
        assert!(matches(&doc(), exists("name", true)));
        assert!(matches(&doc(), exists("absent", false)));
        assert!(!matches(&doc(), exists("absent", true)));
    }

    #[test]
    fn regex_operator() {
        let q = Value::object(vec![(
            "name",
            Value::object(vec![("$regex", Value::from("^ma"))]),
        )]);
        assert!(matches(&doc(), q));

        let q = Value::object(vec![(
            "order",
            Value::object(vec![("$regex", Value::from("4"))]),
        )]);
        assert!(!matches(&doc(), q), "regex only applies to strings");
    }

    #[test]
    fn array_fan_out_on_equality() {
        assert!(matches(&doc(), Value::object(vec![("tags", Value::from("red"))])));
        assert!(!matches(&doc(), Value::object(vec![("tags", Value::from("blue"))])));
    }

    #[test]
    fn whole_array_equality() {
        let q = Value::object(vec![("tags", Value::from(vec!["red", "rocky"]))]);
        assert!(matches(&doc(), q));
    }

    #[test]
    fn dotted_path_fans_out_over_array() {
        let q = Value::object(vec![("moons.name", Value::from("deimos"))]);
        assert!(matches(&doc(), q));
        let q = Value::object(vec![("moons.0.name", Value::from("phobos"))]);
        assert!(matches(&doc(), q));
    }

    #[test]
    fn conjunctive_ops_bind_to_one_element() {
        // No single moon has radius > 10 and < 7.
        let q = Value::object(vec![(
            "moons.radius",
            Value::object(vec![
                ("$gt", Value::Number(10.0)),
                ("$lt", Value::Number(7.0)),
            ]),
        )]);
        assert!(!matches(&doc(), q));

        let q = Value::object(vec![(
            "moons.radius",
            Value::object(vec![
                ("$gt", Value::Number(5.0)),
                ("$lt", Value::Number(7.0)),
            ]),
        )]);
        assert!(matches(&doc(), q));
    }

    #[test]
    fn size_operator() {
        let q = Value::object(vec![("tags", Value::object(vec![("$size", Value::Number(2.0))]))]);
        assert!(matches(&doc(), q));
        let q = Value::object(vec![("tags", Value::object(vec![("$size", Value::Number(3.0))]))]);
        assert!(!matches(&doc(), q));
    }

    #[test]
    fn elem_match_operator() {
        let q = Value::object(vec![(
            "moons",
            Value::object(vec![(
                "$elemMatch",
                Value::object(vec![
                    ("name", Value::from("phobos")),
                    ("radius", Value::object(vec![("$gt", Value::Number(10.0))])),
                ]),
            )]),
        )]);
        assert!(matches(&doc(), q));

        // Both conditions must hold on the same element.
        let q = Value::object(vec![(
            "moons",
            Value::object(vec![(
                "$elemMatch",
                Value::object(vec![
                    ("name", Value::from("deimos")),
                    ("radius", Value::object(vec![("$gt", Value::Number(10.0))])),
                ]),
            )]),
        )]);
        assert!(!matches(&doc(), q));
    }

    #[test]
    fn logical_operators() {
        let q = Value::object(vec![(
            "$or",
            Value::Array(vec![
                Value::object(vec![("name", Value::from("venus"))]),
                Value::object(vec![("order", Value::Number(4.0))]),
            ]),
        )]);
        assert!(matches(&doc(), q));

        let q = Value::object(vec![(
            "$not",
            Value::object(vec![("name", Value::from("mars"))]),
        )]);
        assert!(!matches(&doc(), q));

        let q = Value::object(vec![(
            "$and",
            Value::Array(vec![
                Value::object(vec![("name", Value::from("mars"))]),
                Value::object(vec![("inhabited", Value::Bool(false))]),
            ]),
        )]);
        assert!(matches(&doc(), q));
    }
}
