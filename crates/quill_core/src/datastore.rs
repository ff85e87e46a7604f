//! Datastore facade.
//!
//! A [`DataStore`] owns its indexes, its persistence layer, and its
//! executor. All reads and writes run as executor tasks, so index
//! mutation and log appends never interleave. Index-level failures
//! surface after rollback; persistence failures surface after the
//! in-memory mutation took effect and are reconciled by the next load.

use crate::cursor::{project, sort_documents, Cursor, QueryResults};
use crate::error::{CoreError, CoreResult};
use crate::events::{DbEvent, EventBus};
use crate::executor::Executor;
use crate::id::random_doc_id;
use crate::index::{doc_id, Index, IndexOptions, SharedDoc};
use crate::options::{DataStoreOptions, DEFAULT_CORRUPT_ALERT_THRESHOLD};
use crate::persistence::Persistence;
use crate::query::ast::{parse_query, Query};
use crate::query::matcher::match_query;
use crate::query::modify::{apply_update, parse_update, UpdateSpec};
use crate::query::plan::{plan_candidates, CandidatePlan};
use crate::record::LogRecord;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use quill_codec::{get_dot_value, StringComparator, Value};
use quill_storage::FileLog;
use std::collections::HashMap;
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Field name of the primary key.
const ID_FIELD: &str = "_id";

/// Options for [`DataStore::update`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    /// Update every matching document instead of the first.
    pub multi: bool,
    /// Insert a synthesized document when nothing matches.
    pub upsert: bool,
    /// Return the updated documents, not just their count.
    pub return_updated_docs: bool,
}

/// Result of [`DataStore::update`].
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    /// Number of documents written (including an upserted one).
    pub num_affected: usize,
    /// The inserted document when the update upserted.
    pub upserted: Option<Value>,
    /// Updated documents, when requested via
    /// [`UpdateOptions::return_updated_docs`].
    pub updated_docs: Option<Vec<Value>>,
}

struct AutoCompactor {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl AutoCompactor {
    fn stop(mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub(crate) struct Inner {
    indexes: HashMap<String, Index>,
    ttl: HashMap<String, i64>,
    persistence: Persistence,
    timestamp_data: bool,
    compare_strings: Option<Arc<StringComparator>>,
}

struct Shared {
    executor: Executor,
    inner: Mutex<Inner>,
    events: EventBus,
    autocompaction: Mutex<Option<AutoCompactor>>,
}

/// An embeddable single-process document store.
///
/// Cloning a `DataStore` yields another handle to the same store.
///
/// # Opening a store
///
/// ```rust,ignore
/// use quill_core::DataStore;
///
/// let db = DataStore::open("data/app.db")?;
/// db.insert(Value::object(vec![("name", "sam".into())]))?;
/// ```
///
/// For tests and caches, use [`DataStore::open_in_memory`].
#[derive(Clone)]
pub struct DataStore {
    shared: Arc<Shared>,
}

impl DataStore {
    /// Opens (and loads) a store backed by the given datafile.
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        Self::open_with_options(DataStoreOptions::new().filename(path).autoload(true))
    }

    /// Opens a non-persistent store living only in memory.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_with_options(DataStoreOptions::new().in_memory_only(true).autoload(true))
    }

    /// Opens a store with explicit options.
    ///
    /// Without `autoload`, the store is unready until
    /// [`DataStore::load_database`] completes: operations submitted
    /// before that park in the executor's buffered lane.
    ///
    /// # Errors
    ///
    /// Construction fails on a datafile name ending in `~` (reserved
    /// for crash-safe rewrites) and on a non-invertible serialization
    /// hook pair.
    pub fn open_with_options(options: DataStoreOptions) -> CoreResult<Self> {
        if let Some(path) = &options.filename {
            if path.to_string_lossy().ends_with('~') {
                return Err(CoreError::invalid_operation(
                    "datafile names ending in ~ are reserved for crash-safe rewrites",
                ));
            }
        }

        let in_memory = options.in_memory_only || options.filename.is_none();
        let storage = if in_memory {
            None
        } else {
            options
                .filename
                .as_deref()
                .map(|path| Box::new(FileLog::new(path)) as Box<dyn quill_storage::LogStorage>)
        };

        let persistence = Persistence::new(
            storage,
            options.before_serialization.clone(),
            options.after_serialization.clone(),
            options
                .corrupt_alert_threshold
                .unwrap_or(DEFAULT_CORRUPT_ALERT_THRESHOLD),
        )?;

        let mut indexes = HashMap::new();
        indexes.insert(
            ID_FIELD.to_string(),
            Index::new(
                IndexOptions::new(ID_FIELD).unique(true),
                options.compare_strings.clone(),
            ),
        );

        let store = Self {
            shared: Arc::new(Shared {
                executor: Executor::new(),
                inner: Mutex::new(Inner {
                    indexes,
                    ttl: HashMap::new(),
                    persistence,
                    timestamp_data: options.timestamp_data,
                    compare_strings: options.compare_strings.clone(),
                }),
                events: EventBus::new(),
                autocompaction: Mutex::new(None),
            }),
        };

        if options.autoload {
            store.load_database()?;
        }
        Ok(store)
    }

    /// Loads (or reloads) the database from its datafile.
    ///
    /// Replays the log into the live set, rebuilds every index, rewrites
    /// the compacted log, and opens the executor's buffered lane.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::CorruptLog`] past the corruption
    /// threshold and with [`CoreError::UniqueViolated`] when replayed
    /// documents break a declared constraint; indexes are left empty in
    /// the latter case.
    pub fn load_database(&self) -> CoreResult<()> {
        let shared = Arc::clone(&self.shared);
        let result = self.shared.executor.submit_forced(move || {
            let mut inner = shared.inner.lock();
            load_inner(&mut inner, &shared.events)
        });
        if result.is_ok() {
            self.shared.executor.set_ready();
        }
        result
    }

    /// Inserts one document, returning it with its assigned `_id`.
    pub fn insert(&self, doc: Value) -> CoreResult<Value> {
        let mut inserted = self.insert_many(vec![doc])?;
        match inserted.pop() {
            Some(doc) => Ok(doc),
            None => Err(CoreError::invalid_operation("insert produced no document")),
        }
    }

    /// Inserts a batch of documents atomically with respect to indexes:
    /// a failure on any document leaves every index untouched.
    pub fn insert_many(&self, docs: Vec<Value>) -> CoreResult<Vec<Value>> {
        let shared = Arc::clone(&self.shared);
        self.shared.executor.submit(move || {
            let mut inner = shared.inner.lock();
            insert_inner(&mut inner, docs)
        })
    }

    /// Starts a query; the returned [`Cursor`] runs it on
    /// [`Cursor::exec`].
    pub fn find(&self, query: Value) -> Cursor {
        Cursor::new(self.clone(), query)
    }

    /// Returns the first matching document, if any.
    pub fn find_one(&self, query: Value) -> CoreResult<Option<Value>> {
        let results = self.find(query).limit(1).exec()?;
        Ok(results.into_docs().into_iter().next())
    }

    /// Counts matching documents without materializing them.
    pub fn count(&self, query: Value) -> CoreResult<usize> {
        let shared = Arc::clone(&self.shared);
        self.shared.executor.submit(move || {
            let mut inner = shared.inner.lock();
            let parsed = parse_query(&query)?;
            let candidates = get_candidates(&mut inner, &parsed, false)?;
            Ok(candidates
                .iter()
                .filter(|doc| match_query(doc, &parsed))
                .count())
        })
    }

    /// Updates matching documents.
    pub fn update(
        &self,
        query: Value,
        update: Value,
        options: UpdateOptions,
    ) -> CoreResult<UpdateOutcome> {
        let shared = Arc::clone(&self.shared);
        self.shared.executor.submit(move || {
            let mut inner = shared.inner.lock();
            update_inner(&mut inner, &query, &update, options)
        })
    }

    /// Removes matching documents, returning how many were removed.
    pub fn remove(&self, query: Value, multi: bool) -> CoreResult<usize> {
        let shared = Arc::clone(&self.shared);
        self.shared.executor.submit(move || {
            let mut inner = shared.inner.lock();
            remove_inner(&mut inner, &query, multi)
        })
    }

    /// Declares an index, backfilling it from the live documents.
    ///
    /// Declaring an index that already exists is a no-op.
    pub fn ensure_index(&self, options: IndexOptions) -> CoreResult<()> {
        let shared = Arc::clone(&self.shared);
        self.shared.executor.submit(move || {
            let mut inner = shared.inner.lock();
            ensure_index_inner(&mut inner, options)
        })
    }

    /// Drops an index. The `_id` index cannot be removed.
    pub fn remove_index(&self, field_name: &str) -> CoreResult<()> {
        let field = field_name.to_string();
        let shared = Arc::clone(&self.shared);
        self.shared.executor.submit(move || {
            let mut inner = shared.inner.lock();
            remove_index_inner(&mut inner, &field)
        })
    }

    /// Rewrites the datafile to one record per live document plus one
    /// per index declaration. Emits [`DbEvent::CompactionDone`].
    pub fn compact(&self) -> CoreResult<()> {
        let shared = Arc::clone(&self.shared);
        self.shared.executor.submit(move || {
            let mut inner = shared.inner.lock();
            compact_inner(&mut inner, &shared.events)
        })
    }

    /// Schedules compaction every `interval` (floored at 5 seconds),
    /// replacing any prior schedule.
    pub fn set_autocompaction_interval(&self, interval: Duration) {
        let interval = interval.max(Duration::from_millis(5000));
        let (stop, ticks) = mpsc::channel::<()>();
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);

        let handle = std::thread::spawn(move || loop {
            match ticks.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    let Some(shared) = weak.upgrade() else { break };
                    let store = DataStore { shared };
                    if let Err(err) = store.compact() {
                        warn!(error = %err, "scheduled compaction failed");
                    }
                }
                _ => break,
            }
        });

        let mut slot = self.shared.autocompaction.lock();
        if let Some(previous) = slot.take() {
            previous.stop();
        }
        *slot = Some(AutoCompactor {
            stop,
            handle: Some(handle),
        });
    }

    /// Cancels a schedule installed by
    /// [`DataStore::set_autocompaction_interval`].
    pub fn stop_autocompaction(&self) {
        if let Some(previous) = self.shared.autocompaction.lock().take() {
            previous.stop();
        }
    }

    /// Subscribes to store events.
    pub fn subscribe(&self) -> std::sync::mpsc::Receiver<DbEvent> {
        self.shared.events.subscribe()
    }

    /// Blocks until every queued operation has completed.
    pub fn wait_idle(&self) {
        self.shared.executor.wait_empty();
    }

    pub(crate) fn exec_query(
        &self,
        query: Value,
        projection: Option<Value>,
        sort: Vec<(String, i32)>,
        skip: Option<usize>,
        limit: Option<usize>,
    ) -> CoreResult<QueryResults> {
        let shared = Arc::clone(&self.shared);
        self.shared.executor.submit(move || {
            let mut inner = shared.inner.lock();
            exec_query_inner(&mut inner, &query, projection.as_ref(), &sort, skip, limit)
        })
    }
}

impl std::fmt::Debug for DataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStore")
            .field("executor", &self.shared.executor)
            .finish_non_exhaustive()
    }
}

/// The `_id` index, which always exists: it is created at construction
/// and can never be removed.
fn id_index(inner: &Inner) -> &Index {
    inner
        .indexes
        .get(ID_FIELD)
        .expect("the _id index exists for the lifetime of the store")
}

fn create_new_id(inner: &Inner) -> String {
    loop {
        let id = random_doc_id();
        if id_index(inner)
            .get_matching(&Value::from(id.as_str()))
            .is_empty()
        {
            return id;
        }
    }
}

/// Adds a document to every index; on failure the document is removed
/// from the indexes already touched and the error surfaces.
fn add_to_indexes(inner: &mut Inner, doc: &SharedDoc) -> CoreResult<()> {
    let fields: Vec<String> = inner.indexes.keys().cloned().collect();
    let mut applied: Vec<&String> = Vec::with_capacity(fields.len());

    for field in &fields {
        let Some(index) = inner.indexes.get_mut(field) else {
            continue;
        };
        if let Err(err) = index.insert(doc) {
            for touched in applied {
                if let Some(index) = inner.indexes.get_mut(touched) {
                    index.remove(doc);
                }
            }
            return Err(err);
        }
        applied.push(field);
    }
    Ok(())
}

fn remove_from_indexes(inner: &mut Inner, doc: &SharedDoc) {
    for index in inner.indexes.values_mut() {
        index.remove(doc);
    }
}

/// Applies replacements to every index atomically: a failure on index
/// `k` rolls indexes `0..k` back before surfacing.
fn update_indexes(inner: &mut Inner, pairs: &[(SharedDoc, SharedDoc)]) -> CoreResult<()> {
    let fields: Vec<String> = inner.indexes.keys().cloned().collect();
    let mut applied: Vec<&String> = Vec::with_capacity(fields.len());

    for field in &fields {
        let Some(index) = inner.indexes.get_mut(field) else {
            continue;
        };
        if let Err(err) = index.update_many(pairs) {
            let reverted: Vec<(SharedDoc, SharedDoc)> = pairs
                .iter()
                .map(|(old, new)| (Arc::clone(new), Arc::clone(old)))
                .collect();
            for touched in applied {
                if let Some(index) = inner.indexes.get_mut(touched) {
                    index.update_many(&reverted)?;
                }
            }
            return Err(err);
        }
        applied.push(field);
    }
    Ok(())
}

fn load_inner(inner: &mut Inner, events: &EventBus) -> CoreResult<()> {
    for index in inner.indexes.values_mut() {
        index.reset(None)?;
    }

    if inner.persistence.is_in_memory() {
        return Ok(());
    }

    let raw = inner.persistence.load()?;

    for (field, options) in raw.indexes {
        if inner.indexes.contains_key(&field) {
            continue;
        }
        if let Some(seconds) = options.expire_after_seconds {
            inner.ttl.insert(field.clone(), seconds);
        }
        inner
            .indexes
            .insert(field.clone(), Index::new(options, inner.compare_strings.clone()));
    }

    let docs: Vec<SharedDoc> = raw.docs.into_values().collect();
    let mut failure = None;
    for index in inner.indexes.values_mut() {
        if let Err(err) = index.reset(Some(&docs)) {
            failure = Some(err);
            break;
        }
    }
    if let Some(err) = failure {
        for index in inner.indexes.values_mut() {
            index.reset(None)?;
        }
        return Err(err);
    }

    info!(
        documents = docs.len(),
        indexes = inner.indexes.len() - 1,
        "database loaded"
    );

    compact_inner(inner, events)
}

fn compact_inner(inner: &mut Inner, events: &EventBus) -> CoreResult<()> {
    let docs = id_index(inner).get_all();
    let declarations: Vec<IndexOptions> = inner
        .indexes
        .values()
        .filter(|index| index.field_name() != ID_FIELD)
        .map(|index| index.options().clone())
        .collect();

    if inner.persistence.compact(&docs, &declarations)? {
        info!(documents = docs.len(), "datafile compacted");
        events.emit(DbEvent::CompactionDone);
    }
    Ok(())
}

/// Fetches the candidate superset for a query via the cheapest index,
/// evicting expired TTL documents on the way unless `dont_expire`.
fn get_candidates(
    inner: &mut Inner,
    query: &Query,
    dont_expire: bool,
) -> CoreResult<Vec<SharedDoc>> {
    let plan = plan_candidates(query, |field| inner.indexes.contains_key(field));
    debug!(?plan, "candidate plan");

    let candidates = match plan {
        CandidatePlan::Matching(field, value) => inner
            .indexes
            .get(&field)
            .map(|index| index.get_matching(&value))
            .unwrap_or_default(),
        CandidatePlan::In(field, values) => inner
            .indexes
            .get(&field)
            .map(|index| index.get_matching(&Value::Array(values)))
            .unwrap_or_default(),
        CandidatePlan::Range(field, range) => inner
            .indexes
            .get(&field)
            .map(|index| index.get_between_bounds(&range))
            .unwrap_or_default(),
        CandidatePlan::Scan => id_index(inner).get_all(),
    };

    if dont_expire || inner.ttl.is_empty() {
        return Ok(candidates);
    }

    let now = Utc::now();
    let mut live = Vec::with_capacity(candidates.len());
    let mut expired = Vec::new();
    for doc in candidates {
        let is_expired = inner.ttl.iter().any(|(field, seconds)| {
            matches!(
                get_dot_value(&doc, field),
                Some(Value::DateTime(stamp))
                    if now > stamp + ChronoDuration::seconds(*seconds)
            )
        });
        if is_expired {
            expired.push(doc);
        } else {
            live.push(doc);
        }
    }

    if !expired.is_empty() {
        let mut tombstones = Vec::with_capacity(expired.len());
        for doc in &expired {
            remove_from_indexes(inner, doc);
            tombstones.push(LogRecord::Deleted(doc_id(doc).to_string()));
        }
        inner.persistence.persist_new_state(&tombstones)?;
        debug!(evicted = expired.len(), "expired documents removed");
    }

    Ok(live)
}

fn insert_inner(inner: &mut Inner, docs: Vec<Value>) -> CoreResult<Vec<Value>> {
    let now = Utc::now();

    let mut prepared: Vec<SharedDoc> = Vec::with_capacity(docs.len());
    for mut doc in docs {
        if doc.as_object().is_none() {
            return Err(CoreError::invalid_query("documents must be objects"));
        }

        let needs_id = match doc.get(ID_FIELD) {
            None => true,
            Some(Value::String(_)) => false,
            Some(_) => return Err(CoreError::invalid_query("_id must be a string")),
        };
        if needs_id {
            let id = create_new_id(inner);
            if let Some(map) = doc.as_object_mut() {
                map.insert(ID_FIELD.to_string(), Value::String(id));
            }
        }

        if inner.timestamp_data {
            if let Some(map) = doc.as_object_mut() {
                map.entry("createdAt".to_string())
                    .or_insert(Value::DateTime(now));
                map.entry("updatedAt".to_string())
                    .or_insert(Value::DateTime(now));
            }
        }

        doc.validate_keys()?;
        prepared.push(Arc::new(doc));
    }

    for (done, doc) in prepared.iter().enumerate() {
        if let Err(err) = add_to_indexes(inner, doc) {
            for reverted in &prepared[..done] {
                remove_from_indexes(inner, reverted);
            }
            return Err(err);
        }
    }

    let records: Vec<LogRecord> = prepared
        .iter()
        .map(|doc| LogRecord::Doc(Arc::clone(doc)))
        .collect();
    inner.persistence.persist_new_state(&records)?;

    Ok(prepared.iter().map(|doc| (**doc).clone()).collect())
}

fn update_inner(
    inner: &mut Inner,
    query: &Value,
    update: &Value,
    options: UpdateOptions,
) -> CoreResult<UpdateOutcome> {
    let parsed_query = parse_query(query)?;
    let spec = parse_update(update)?;
    let now = Utc::now();

    if options.upsert {
        let candidates = get_candidates(inner, &parsed_query, false)?;
        let any_match = candidates.iter().any(|doc| match_query(doc, &parsed_query));
        if !any_match {
            let to_insert = match &spec {
                UpdateSpec::Replace(new_doc) => new_doc.clone(),
                UpdateSpec::Operators(_) => {
                    // The query, stripped of operator clauses, seeds the
                    // upserted document.
                    apply_update(&query.stripped_clone(), &spec)?
                }
            };
            let inserted = insert_inner(inner, vec![to_insert])?;
            return Ok(UpdateOutcome {
                num_affected: 1,
                upserted: inserted.into_iter().next(),
                updated_docs: None,
            });
        }
    }

    let candidates = get_candidates(inner, &parsed_query, false)?;
    let mut pairs: Vec<(SharedDoc, SharedDoc)> = Vec::new();
    for candidate in candidates {
        if !match_query(&candidate, &parsed_query) {
            continue;
        }
        if !options.multi && !pairs.is_empty() {
            break;
        }

        let mut new_doc = apply_update(&candidate, &spec)?;
        if inner.timestamp_data {
            if let Some(map) = new_doc.as_object_mut() {
                if let Some(created) = candidate.get("createdAt") {
                    map.insert("createdAt".to_string(), created.clone());
                }
                map.insert("updatedAt".to_string(), Value::DateTime(now));
            }
        }
        pairs.push((candidate, Arc::new(new_doc)));
    }

    update_indexes(inner, &pairs)?;

    let records: Vec<LogRecord> = pairs
        .iter()
        .map(|(_, new)| LogRecord::Doc(Arc::clone(new)))
        .collect();
    inner.persistence.persist_new_state(&records)?;

    Ok(UpdateOutcome {
        num_affected: pairs.len(),
        upserted: None,
        updated_docs: options
            .return_updated_docs
            .then(|| pairs.iter().map(|(_, new)| (**new).clone()).collect()),
    })
}

fn remove_inner(inner: &mut Inner, query: &Value, multi: bool) -> CoreResult<usize> {
    let parsed = parse_query(query)?;
    let candidates = get_candidates(inner, &parsed, true)?;

    let mut tombstones = Vec::new();
    for candidate in candidates {
        if !match_query(&candidate, &parsed) {
            continue;
        }
        if !multi && !tombstones.is_empty() {
            break;
        }
        remove_from_indexes(inner, &candidate);
        tombstones.push(LogRecord::Deleted(doc_id(&candidate).to_string()));
    }

    let removed = tombstones.len();
    inner.persistence.persist_new_state(&tombstones)?;
    Ok(removed)
}

fn ensure_index_inner(inner: &mut Inner, options: IndexOptions) -> CoreResult<()> {
    if options.field_name.is_empty() {
        return Err(CoreError::MissingFieldName);
    }
    if inner.indexes.contains_key(&options.field_name) {
        return Ok(());
    }
    if let Some(seconds) = options.expire_after_seconds {
        if seconds <= 0 {
            return Err(CoreError::invalid_query(
                "expireAfterSeconds must be positive",
            ));
        }
    }

    let mut index = Index::new(options.clone(), inner.compare_strings.clone());
    let docs = id_index(inner).get_all();
    index.insert_many(&docs)?;

    if let Some(seconds) = options.expire_after_seconds {
        inner.ttl.insert(options.field_name.clone(), seconds);
    }
    inner.indexes.insert(options.field_name.clone(), index);

    inner
        .persistence
        .persist_new_state(&[LogRecord::IndexCreated(options)])
}

fn remove_index_inner(inner: &mut Inner, field: &str) -> CoreResult<()> {
    if field == ID_FIELD {
        return Err(CoreError::invalid_operation(
            "the _id index cannot be removed",
        ));
    }
    inner.indexes.remove(field);
    inner.ttl.remove(field);
    inner
        .persistence
        .persist_new_state(&[LogRecord::IndexRemoved(field.to_string())])
}

fn exec_query_inner(
    inner: &mut Inner,
    query: &Value,
    projection: Option<&Value>,
    sort: &[(String, i32)],
    skip: Option<usize>,
    limit: Option<usize>,
) -> CoreResult<QueryResults> {
    let parsed = parse_query(query)?;
    let candidates = get_candidates(inner, &parsed, false)?;
    let skip_count = skip.unwrap_or(0);

    let (selected, total) = if sort.is_empty() {
        let mut matched = 0usize;
        let mut selected = Vec::new();
        for candidate in candidates {
            if !match_query(&candidate, &parsed) {
                continue;
            }
            matched += 1;
            if matched <= skip_count {
                continue;
            }
            selected.push(candidate);
            if limit.is_some_and(|cap| selected.len() >= cap) {
                break;
            }
        }
        (selected, matched)
    } else {
        let mut matched: Vec<SharedDoc> = candidates
            .into_iter()
            .filter(|candidate| match_query(candidate, &parsed))
            .collect();
        sort_documents(&mut matched, sort, inner.compare_strings.as_ref());
        let total = matched.len();
        let selected = matched
            .into_iter()
            .skip(skip_count)
            .take(limit.unwrap_or(usize::MAX))
            .collect();
        (selected, total)
    };

    let docs: Vec<Value> = selected
        .iter()
        .map(|doc| match projection {
            Some(projection) => project(doc, projection),
            None => Ok((**doc).clone()),
        })
        .collect::<CoreResult<_>>()?;

    Ok(QueryResults::new(docs, total))
}
