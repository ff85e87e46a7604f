//! Lazy query plan.
//!
//! A [`Cursor`] accumulates the query, sort, skip/limit, and projection,
//! and only touches the store when executed: candidates → match → sort →
//! skip/limit → project. Execution routes through the store's executor,
//! so a cursor never observes a mid-mutation index state. Results are
//! deep copies; callers cannot reach the store's internal documents.

use crate::datastore::DataStore;
use crate::error::{CoreError, CoreResult};
use crate::index::SharedDoc;
use quill_codec::{get_dot_value, set_dot_value, unset_dot_value, StringComparator, Value};
use std::cmp::Ordering;
use std::sync::Arc;

/// A lazy query against a datastore.
#[derive(Debug, Clone)]
pub struct Cursor {
    store: DataStore,
    query: Value,
    projection: Option<Value>,
    sort: Vec<(String, i32)>,
    skip: Option<usize>,
    limit: Option<usize>,
}

impl Cursor {
    pub(crate) fn new(store: DataStore, query: Value) -> Self {
        Self {
            store,
            query,
            projection: None,
            sort: Vec::new(),
            skip: None,
            limit: None,
        }
    }

    /// Sorts results by the given keys in declaration order; a positive
    /// direction is ascending, a negative one descending.
    #[must_use]
    pub fn sort(mut self, keys: &[(&str, i32)]) -> Self {
        self.sort = keys
            .iter()
            .map(|(path, direction)| ((*path).to_string(), *direction))
            .collect();
        self
    }

    /// Skips the first `n` results.
    #[must_use]
    pub fn skip(mut self, n: usize) -> Self {
        self.skip = Some(n);
        self
    }

    /// Caps the number of results at `n`.
    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Restricts returned fields: `{field: 1}` keeps listed fields,
    /// `{field: 0}` drops them. `_id` may always be excluded.
    #[must_use]
    pub fn projection(mut self, projection: Value) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Runs the query through the store's executor.
    pub fn exec(self) -> CoreResult<QueryResults> {
        let Cursor {
            store,
            query,
            projection,
            sort,
            skip,
            limit,
        } = self;
        store.exec_query(query, projection, sort, skip, limit)
    }
}

/// Results of a cursor execution.
///
/// `total_count` is the number of matching documents observed before
/// skip/limit slicing.
#[derive(Debug, Clone)]
pub struct QueryResults {
    docs: Vec<Value>,
    total_count: usize,
}

impl QueryResults {
    pub(crate) fn new(docs: Vec<Value>, total_count: usize) -> Self {
        Self { docs, total_count }
    }

    /// The returned documents.
    pub fn docs(&self) -> &[Value] {
        &self.docs
    }

    /// Consumes the results, yielding the documents.
    pub fn into_docs(self) -> Vec<Value> {
        self.docs
    }

    /// Matching documents before skip/limit were applied.
    pub fn total_count(&self) -> usize {
        self.total_count
    }

    /// Number of returned documents.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// True when nothing matched.
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

impl IntoIterator for QueryResults {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.docs.into_iter()
    }
}

/// Multi-key in-place sort; keys apply in declaration order.
pub(crate) fn sort_documents(
    docs: &mut [SharedDoc],
    keys: &[(String, i32)],
    strings: Option<&Arc<StringComparator>>,
) {
    let strings = strings.map(Arc::as_ref);
    docs.sort_by(|a, b| {
        for (path, direction) in keys {
            let left = get_dot_value(a, path).unwrap_or(Value::Null);
            let right = get_dot_value(b, path).unwrap_or(Value::Null);
            let mut ord = left.compare_with(&right, strings);
            if *direction < 0 {
                ord = ord.reverse();
            }
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// Applies a projection to one document.
///
/// # Errors
///
/// Fails with [`CoreError::MixedProjection`] when inclusion and
/// exclusion are mixed (other than `_id`).
pub(crate) fn project(doc: &Value, projection: &Value) -> CoreResult<Value> {
    let map = projection
        .as_object()
        .ok_or_else(|| CoreError::invalid_query("projection must be an object"))?;

    let mut id_action = None;
    let mut keep = Vec::new();
    let mut omit = Vec::new();
    for (path, flag) in map {
        let include = match flag.as_number() {
            Some(n) if n == 0.0 => false,
            Some(n) if n == 1.0 => true,
            _ => {
                return Err(CoreError::invalid_query(
                    "projection values must be 0 or 1",
                ))
            }
        };
        if path == "_id" {
            id_action = Some(include);
        } else if include {
            keep.push(path);
        } else {
            omit.push(path);
        }
    }

    if !keep.is_empty() && !omit.is_empty() {
        return Err(CoreError::MixedProjection);
    }

    if !keep.is_empty() {
        let mut result = Value::Object(Default::default());
        for path in keep {
            if let Some(value) = get_dot_value(doc, path) {
                set_dot_value(&mut result, path, value);
            }
        }
        if id_action != Some(false) {
            if let Some(id) = doc.get("_id") {
                set_dot_value(&mut result, "_id", id.clone());
            }
        }
        return Ok(result);
    }

    let mut result = doc.clone();
    for path in omit {
        unset_dot_value(&mut result, path);
    }
    if id_action == Some(false) {
        unset_dot_value(&mut result, "_id");
    }
    Ok(result)
}
