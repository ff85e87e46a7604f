//! Candidate planning.
//!
//! The planner picks the cheapest index access for a query so the
//! matcher only examines a superset of the matching documents. Selection
//! runs in three passes over the query's top-level field clauses,
//! stopping at the first hit: exact match on a primitive equality, then
//! `$in` membership, then a range, and finally a full scan.

use crate::index::RangeQuery;
use crate::query::ast::{FieldClause, FieldOp, Query};
use quill_codec::Value;

/// The access path chosen for a query.
#[derive(Debug, Clone)]
pub enum CandidatePlan {
    /// Exact-key lookup on the named index.
    Matching(String, Value),
    /// Union of exact-key lookups on the named index.
    In(String, Vec<Value>),
    /// Range traversal on the named index.
    Range(String, RangeQuery),
    /// Full scan of the `_id` index.
    Scan,
}

/// Chooses the access path for a parsed query.
///
/// `has_index` reports whether a field has a registered index.
pub fn plan_candidates(query: &Query, has_index: impl Fn(&str) -> bool) -> CandidatePlan {
    let Query::And(clauses) = query else {
        return CandidatePlan::Scan;
    };

    let field_clauses: Vec<&FieldClause> = clauses
        .iter()
        .filter_map(|clause| match clause {
            Query::Field(fc) if has_index(&fc.path) => Some(fc),
            _ => None,
        })
        .collect();

    for clause in &field_clauses {
        for op in &clause.ops {
            if let FieldOp::Eq(value) = op {
                if value.is_primitive() {
                    return CandidatePlan::Matching(clause.path.clone(), value.clone());
                }
            }
        }
    }

    for clause in &field_clauses {
        for op in &clause.ops {
            if let FieldOp::In(values) = op {
                return CandidatePlan::In(clause.path.clone(), values.clone());
            }
        }
    }

    for clause in &field_clauses {
        let mut range = RangeQuery::default();
        let mut found = false;
        for op in &clause.ops {
            match op {
                FieldOp::Lt(v) => {
                    range.lt = Some(v.clone());
                    found = true;
                }
                FieldOp::Lte(v) => {
                    range.lte = Some(v.clone());
                    found = true;
                }
                FieldOp::Gt(v) => {
                    range.gt = Some(v.clone());
                    found = true;
                }
                FieldOp::Gte(v) => {
                    range.gte = Some(v.clone());
                    found = true;
                }
                _ => {}
            }
        }
        if found {
            return CandidatePlan::Range(clause.path.clone(), range);
        }
    }

    CandidatePlan::Scan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::parse_query;

    fn plan(query: Value, indexed: &[&str]) -> CandidatePlan {
        let parsed = parse_query(&query).unwrap();
        plan_candidates(&parsed, |field| indexed.contains(&field))
    }

    #[test]
    fn primitive_equality_wins() {
        let query = Value::object(vec![
            ("a", Value::object(vec![("$gt", Value::Number(1.0))])),
            ("b", Value::from("x")),
        ]);
        let plan = plan(query, &["a", "b"]);
        assert!(matches!(plan, CandidatePlan::Matching(field, _) if field == "b"));
    }

    #[test]
    fn object_equality_does_not_use_an_index() {
        let query = Value::object(vec![(
            "a",
            Value::object(vec![("nested", Value::Number(1.0))]),
        )]);
        assert!(matches!(plan(query, &["a"]), CandidatePlan::Scan));
    }

    #[test]
    fn in_beats_range() {
        let query = Value::object(vec![
            ("a", Value::object(vec![("$gt", Value::Number(1.0))])),
            ("b", Value::object(vec![("$in", Value::from(vec![1.0, 2.0]))])),
        ]);
        let plan = plan(query, &["a", "b"]);
        assert!(matches!(plan, CandidatePlan::In(field, values) if field == "b" && values.len() == 2));
    }

    #[test]
    fn range_collects_all_bounds() {
        let query = Value::object(vec![(
            "a",
            Value::object(vec![
                ("$gte", Value::Number(1.0)),
                ("$lt", Value::Number(9.0)),
            ]),
        )]);
        let CandidatePlan::Range(field, range) = plan(query, &["a"]) else {
            panic!("expected a range plan");
        };
        assert_eq!(field, "a");
        assert_eq!(range.gte, Some(Value::Number(1.0)));
        assert_eq!(range.lt, Some(Value::Number(9.0)));
        assert_eq!(range.gt, None);
    }

    #[test]
    fn unindexed_fields_fall_back_to_scan() {
        let query = Value::object(vec![("c", Value::from("x"))]);
        assert!(matches!(plan(query, &["a"]), CandidatePlan::Scan));
    }

    #[test]
    fn logical_only_queries_scan() {
        let query = Value::object(vec![(
            "$or",
            Value::Array(vec![Value::object(vec![("a", Value::Number(1.0))])]),
        )]);
        assert!(matches!(plan(query, &["a"]), CandidatePlan::Scan));
    }
}
