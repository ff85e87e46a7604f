//! Secondary indexes.
//!
//! An [`Index`] projects every live document onto one dotted field and
//! keeps the projections in an ordered multimap (key → shared document
//! references). Array-valued keys insert the document once per distinct
//! element; `unique` rejects key collisions; `sparse` omits documents
//! lacking the field. All batch operations roll back on failure, leaving
//! the tree in its pre-operation state.

use crate::error::{CoreError, CoreResult};
use quill_codec::{get_dot_value, serialize, StringComparator, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

/// A live document, shared between the `_id` index and every secondary
/// index. The `_id` index holds the authoritative live set.
pub type SharedDoc = Arc<Value>;

/// Reads a document's primary key.
pub fn doc_id(doc: &Value) -> &str {
    doc.get("_id").and_then(Value::as_str).unwrap_or("")
}

/// Declaration of an index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexOptions {
    /// Dotted field the index projects on.
    pub field_name: String,
    /// Whether two documents may share a key.
    pub unique: bool,
    /// Whether documents lacking the field are omitted.
    pub sparse: bool,
    /// Time-to-live in seconds for the indexed timestamp field.
    pub expire_after_seconds: Option<i64>,
}

impl IndexOptions {
    /// Creates a declaration for the given field.
    pub fn new(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            unique: false,
            sparse: false,
            expire_after_seconds: None,
        }
    }

    /// Makes this a unique index.
    #[must_use]
    pub fn unique(mut self, value: bool) -> Self {
        self.unique = value;
        self
    }

    /// Makes this a sparse index.
    #[must_use]
    pub fn sparse(mut self, value: bool) -> Self {
        self.sparse = value;
        self
    }

    /// Declares a TTL over the indexed timestamp field.
    #[must_use]
    pub fn expire_after_seconds(mut self, seconds: i64) -> Self {
        self.expire_after_seconds = Some(seconds);
        self
    }
}

/// Range bounds for [`Index::get_between_bounds`], parsed from a
/// `$lt`/`$lte`/`$gt`/`$gte` sub-query.
#[derive(Debug, Clone, Default)]
pub struct RangeQuery {
    /// Exclusive lower bound.
    pub gt: Option<Value>,
    /// Inclusive lower bound.
    pub gte: Option<Value>,
    /// Exclusive upper bound.
    pub lt: Option<Value>,
    /// Inclusive upper bound.
    pub lte: Option<Value>,
}

/// An index key: a value ordered by the store's comparator.
///
/// The optional string comparator travels inside the key so that the
/// `Ord` impl the tree relies on stays a pure function of its operands.
#[derive(Clone)]
pub struct IndexKey {
    value: Value,
    strings: Option<Arc<StringComparator>>,
}

impl IndexKey {
    fn new(value: Value, strings: Option<Arc<StringComparator>>) -> Self {
        Self { value, strings }
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.compare_with(&other.value, self.strings.as_deref())
    }
}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

impl std::fmt::Debug for IndexKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IndexKey({:?})", self.value)
    }
}

/// Renders a key for error messages.
fn render_key(value: &Value) -> String {
    serialize(value).unwrap_or_else(|_| format!("{value:?}"))
}

/// An ordered multimap over one dotted field of every document.
pub struct Index {
    options: IndexOptions,
    strings: Option<Arc<StringComparator>>,
    tree: BTreeMap<IndexKey, Vec<SharedDoc>>,
}

impl Index {
    /// Creates an empty index from a declaration.
    pub fn new(options: IndexOptions, strings: Option<Arc<StringComparator>>) -> Self {
        Self {
            options,
            strings,
            tree: BTreeMap::new(),
        }
    }

    /// Returns the declaration this index was built from.
    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    /// Returns the indexed field.
    pub fn field_name(&self) -> &str {
        &self.options.field_name
    }

    /// Number of documents held (documents with array keys count once
    /// per distinct element).
    pub fn len(&self) -> usize {
        self.tree.values().map(Vec::len).sum()
    }

    /// Returns true if the index holds no documents.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    fn key(&self, value: Value) -> IndexKey {
        IndexKey::new(value, self.strings.clone())
    }

    /// Projects a document onto the index keys it occupies.
    ///
    /// Returns `None` when a sparse index omits the document. An absent
    /// field on a non-sparse index projects to `Null`; an array value
    /// projects to its distinct elements.
    fn extract_keys(&self, doc: &Value) -> CoreResult<Option<Vec<Value>>> {
        let raw = get_dot_value(doc, &self.options.field_name);

        let Some(raw) = raw else {
            if self.options.sparse {
                return Ok(None);
            }
            return Ok(Some(vec![Value::Null]));
        };

        match raw {
            Value::Object(_) => Err(CoreError::InvalidIndexField {
                field: self.options.field_name.clone(),
            }),
            Value::Array(items) => {
                let mut distinct: Vec<Value> = Vec::with_capacity(items.len());
                for item in items {
                    if matches!(item, Value::Object(_)) {
                        return Err(CoreError::InvalidIndexField {
                            field: self.options.field_name.clone(),
                        });
                    }
                    if !distinct.iter().any(|seen| seen.equals(&item)) {
                        distinct.push(item);
                    }
                }
                Ok(Some(distinct))
            }
            other => Ok(Some(vec![other])),
        }
    }

    /// Inserts a document.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::UniqueViolated`] if any key element is
    /// already taken on a unique index; the tree is rolled back to its
    /// pre-call state first.
    pub fn insert(&mut self, doc: &SharedDoc) -> CoreResult<()> {
        let Some(keys) = self.extract_keys(doc)? else {
            return Ok(());
        };

        for (done, key_value) in keys.iter().enumerate() {
            let key = self.key(key_value.clone());
            if self.options.unique {
                if self.tree.get(&key).is_some_and(|docs| !docs.is_empty()) {
                    for reverted in &keys[..done] {
                        self.remove_key(reverted.clone(), doc);
                    }
                    return Err(CoreError::unique_violated(
                        &self.options.field_name,
                        render_key(key_value),
                    ));
                }
            }
            self.tree.entry(key).or_default().push(Arc::clone(doc));
        }
        Ok(())
    }

    /// Removes a document. Always safe; unknown documents are a no-op.
    pub fn remove(&mut self, doc: &SharedDoc) {
        let Ok(Some(keys)) = self.extract_keys(doc) else {
            return;
        };
        for key_value in keys {
            self.remove_key(key_value, doc);
        }
    }

    fn remove_key(&mut self, key_value: Value, doc: &SharedDoc) {
        let key = self.key(key_value);
        if let Some(docs) = self.tree.get_mut(&key) {
            let id = doc_id(doc);
            docs.retain(|held| doc_id(held) != id);
            if docs.is_empty() {
                self.tree.remove(&key);
            }
        }
    }

    /// Replaces `old` with `new`.
    ///
    /// # Errors
    ///
    /// On failure `old` is reinserted and the error surfaces; the tree
    /// ends in its pre-call state.
    pub fn update(&mut self, old: &SharedDoc, new: &SharedDoc) -> CoreResult<()> {
        self.remove(old);
        if let Err(err) = self.insert(new) {
            self.insert(old)?;
            return Err(err);
        }
        Ok(())
    }

    /// Inserts a batch; position `i` failing reverts positions `0..i`.
    pub fn insert_many(&mut self, docs: &[SharedDoc]) -> CoreResult<()> {
        for (done, doc) in docs.iter().enumerate() {
            if let Err(err) = self.insert(doc) {
                for reverted in &docs[..done] {
                    self.remove(reverted);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Applies a batch of replacements; failure reverts the prefix.
    pub fn update_many(&mut self, pairs: &[(SharedDoc, SharedDoc)]) -> CoreResult<()> {
        for (done, (old, new)) in pairs.iter().enumerate() {
            if let Err(err) = self.update(old, new) {
                for (reverted_old, reverted_new) in pairs[..done].iter().rev() {
                    self.update(reverted_new, reverted_old)?;
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Exact-key lookup. An array argument unions the results over its
    /// elements, de-duplicated by `_id`.
    pub fn get_matching(&self, value: &Value) -> Vec<SharedDoc> {
        match value {
            Value::Array(items) => {
                let mut seen: Vec<String> = Vec::new();
                let mut result = Vec::new();
                for item in items {
                    for doc in self.get_matching(item) {
                        let id = doc_id(&doc).to_string();
                        if !seen.contains(&id) {
                            seen.push(id);
                            result.push(doc);
                        }
                    }
                }
                result
            }
            _ => self
                .tree
                .get(&self.key(value.clone()))
                .cloned()
                .unwrap_or_default(),
        }
    }

    /// Returns documents with keys inside the range, in ascending key
    /// order.
    pub fn get_between_bounds(&self, range: &RangeQuery) -> Vec<SharedDoc> {
        let lower = match (&range.gt, &range.gte) {
            (Some(v), _) => Bound::Excluded(self.key(v.clone())),
            (None, Some(v)) => Bound::Included(self.key(v.clone())),
            (None, None) => Bound::Unbounded,
        };
        let upper = match (&range.lt, &range.lte) {
            (Some(v), _) => Bound::Excluded(self.key(v.clone())),
            (None, Some(v)) => Bound::Included(self.key(v.clone())),
            (None, None) => Bound::Unbounded,
        };

        // BTreeMap::range panics on an inverted or doubly-excluded empty
        // range; those select nothing.
        if let (
            Bound::Included(lo) | Bound::Excluded(lo),
            Bound::Included(hi) | Bound::Excluded(hi),
        ) = (&lower, &upper)
        {
            match lo.cmp(hi) {
                Ordering::Greater => return Vec::new(),
                Ordering::Equal => {
                    let both_included = matches!(lower, Bound::Included(_))
                        && matches!(upper, Bound::Included(_));
                    if !both_included {
                        return Vec::new();
                    }
                }
                Ordering::Less => {}
            }
        }

        self.tree
            .range((lower, upper))
            .flat_map(|(_, docs)| docs.iter().cloned())
            .collect()
    }

    /// In-order traversal of all documents.
    pub fn get_all(&self) -> Vec<SharedDoc> {
        self.tree
            .values()
            .flat_map(|docs| docs.iter().cloned())
            .collect()
    }

    /// Drops the tree; with `new_docs` given, bulk-inserts them.
    ///
    /// # Errors
    ///
    /// On a bulk-insert failure the index ends up empty, never partially
    /// populated.
    pub fn reset(&mut self, new_docs: Option<&[SharedDoc]>) -> CoreResult<()> {
        self.tree.clear();
        if let Some(docs) = new_docs {
            if let Err(err) = self.insert_many(docs) {
                self.tree.clear();
                return Err(err);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("options", &self.options)
            .field("keys", &self.tree.len())
            .finish_non_exhaustive()
    }
}
