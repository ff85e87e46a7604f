//! Datafile persistence.
//!
//! Encodes in-memory state as newline-delimited records, folds the log
//! back into the live set on load, and drives compaction. Optional
//! serialization hooks transform every line on its way to and from the
//! log; the pair is verified invertible at construction so a
//! misconfigured hook cannot silently destroy data.

use crate::error::{CoreError, CoreResult};
use crate::id::random_string;
use crate::index::{IndexOptions, SharedDoc};
use crate::record::LogRecord;
use quill_storage::LogStorage;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// A log text hook: applied to every serialized line before write
/// (`before_write`) or after read (`after_read`).
pub type SerializationHook = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Result of folding the raw log.
#[derive(Default, Debug)]
pub struct RawLoad {
    /// Live documents by `_id` after applying tombstones.
    pub docs: HashMap<String, SharedDoc>,
    /// Index declarations by field name after applying removals.
    pub indexes: HashMap<String, IndexOptions>,
}

/// Persistence layer over a [`LogStorage`].
///
/// A store without a datafile (in-memory only) has no storage; every
/// persistence call is then a no-op.
pub struct Persistence {
    storage: Option<Box<dyn LogStorage>>,
    before_write: Option<SerializationHook>,
    after_read: Option<SerializationHook>,
    corrupt_alert_threshold: f64,
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence")
            .field("storage", &self.storage.is_some())
            .field("before_write", &self.before_write.is_some())
            .field("after_read", &self.after_read.is_some())
            .field("corrupt_alert_threshold", &self.corrupt_alert_threshold)
            .finish()
    }
}

impl Persistence {
    /// Creates the persistence layer, verifying the hook pair.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::HookNotInvertible`] if hooks are
    /// configured and `after_read ∘ before_write` is not the identity on
    /// a battery of random strings.
    pub fn new(
        storage: Option<Box<dyn LogStorage>>,
        before_write: Option<SerializationHook>,
        after_read: Option<SerializationHook>,
        corrupt_alert_threshold: f64,
    ) -> CoreResult<Self> {
        if before_write.is_some() || after_read.is_some() {
            verify_hooks(before_write.as_ref(), after_read.as_ref())?;
        }
        Ok(Self {
            storage,
            before_write,
            after_read,
            corrupt_alert_threshold,
        })
    }

    /// Returns true when no datafile backs this store.
    pub fn is_in_memory(&self) -> bool {
        self.storage.is_none()
    }

    fn encode_line(&self, record: &LogRecord) -> CoreResult<String> {
        let raw = record.encode()?;
        Ok(match &self.before_write {
            Some(hook) => hook(&raw),
            None => raw,
        })
    }

    /// Appends one line per record to the log.
    pub fn persist_new_state(&mut self, records: &[LogRecord]) -> CoreResult<()> {
        if self.storage.is_none() || records.is_empty() {
            return Ok(());
        }

        let mut data = String::new();
        for record in records {
            data.push_str(&self.encode_line(record)?);
            data.push('\n');
        }
        if let Some(storage) = self.storage.as_mut() {
            storage.append(&data)?;
        }
        Ok(())
    }

    /// Ensures the datafile is readable and folds it into memory.
    pub fn load(&mut self) -> CoreResult<RawLoad> {
        let Some(storage) = self.storage.as_mut() else {
            return Ok(RawLoad::default());
        };
        storage.ensure_integrity()?;
        let raw = storage.read_all()?;
        self.treat_raw_data(&raw)
    }

    /// Folds raw log text into the live set and index declarations.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::CorruptLog`] when the fraction of
    /// unparsable lines exceeds the corruption threshold (the expected
    /// final newline is not counted).
    pub fn treat_raw_data(&self, raw: &str) -> CoreResult<RawLoad> {
        let lines: Vec<&str> = raw.split('\n').collect();
        let total = lines.len();
        let mut corrupt = 0usize;
        let mut load = RawLoad::default();

        for line in lines {
            let restored = match &self.after_read {
                Some(hook) => hook(line),
                None => line.to_string(),
            };
            match LogRecord::decode(&restored) {
                Ok(LogRecord::Doc(doc)) => {
                    let id = crate::index::doc_id(&doc).to_string();
                    load.docs.insert(id, doc);
                }
                Ok(LogRecord::Deleted(id)) => {
                    load.docs.remove(&id);
                }
                Ok(LogRecord::IndexCreated(options)) => {
                    load.indexes.insert(options.field_name.clone(), options);
                }
                Ok(LogRecord::IndexRemoved(field)) => {
                    load.indexes.remove(&field);
                }
                Err(_) => corrupt += 1,
            }
        }

        // The final newline produces one empty, unparsable line.
        let corrupt = corrupt.saturating_sub(1);
        if corrupt > 0 {
            let ratio = corrupt as f64 / total as f64;
            warn!(corrupt, total, ratio, "skipped unreadable datafile lines");
            if ratio > self.corrupt_alert_threshold {
                return Err(CoreError::corrupt_log(ratio));
            }
        }

        Ok(load)
    }

    /// Rewrites the log to exactly the live documents plus the
    /// declarations of the given indexes, crash-safely.
    ///
    /// Returns false when the store is in-memory and nothing was
    /// written.
    pub fn compact(
        &mut self,
        docs: &[SharedDoc],
        indexes: &[IndexOptions],
    ) -> CoreResult<bool> {
        if self.storage.is_none() {
            return Ok(false);
        }

        let mut data = String::new();
        for doc in docs {
            data.push_str(&self.encode_line(&LogRecord::Doc(Arc::clone(doc)))?);
            data.push('\n');
        }
        for options in indexes {
            data.push_str(&self.encode_line(&LogRecord::IndexCreated(options.clone()))?);
            data.push('\n');
        }

        if let Some(storage) = self.storage.as_mut() {
            storage.rewrite(&data)?;
        }
        Ok(true)
    }
}

/// Checks `after_read ∘ before_write = identity` on random strings of
/// lengths 1 through 29, ten samples each. A lone hook is paired with
/// the identity and therefore fails unless it is itself the identity.
fn verify_hooks(
    before_write: Option<&SerializationHook>,
    after_read: Option<&SerializationHook>,
) -> CoreResult<()> {
    for len in 1..30 {
        for _ in 0..10 {
            let sample = random_string(len);
            let written = match before_write {
                Some(hook) => hook(&sample),
                None => sample.clone(),
            };
            let restored = match after_read {
                Some(hook) => hook(&written),
                None => written,
            };
            if restored != sample {
                return Err(CoreError::HookNotInvertible);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_codec::Value;
    use quill_storage::MemoryLog;

    fn doc(id: &str, n: f64) -> SharedDoc {
        Arc::new(Value::object(vec![
            ("_id", Value::from(id)),
            ("n", Value::Number(n)),
        ]))
    }

    fn plain(storage: MemoryLog) -> Persistence {
        Persistence::new(Some(Box::new(storage)), None, None, 0.1).unwrap()
    }

    #[test]
    fn append_then_fold() {
        let mut persistence = plain(MemoryLog::new());
        persistence
            .persist_new_state(&[
                LogRecord::Doc(doc("a", 1.0)),
                LogRecord::Doc(doc("b", 2.0)),
                LogRecord::Doc(doc("a", 3.0)),
            ])
            .unwrap();

        let load = persistence.load().unwrap();
        assert_eq!(load.docs.len(), 2);
        assert_eq!(
            load.docs.get("a").unwrap().get("n"),
            Some(&Value::Number(3.0))
        );
    }

    #[test]
    fn tombstones_delete_on_replay() {
        let mut persistence = plain(MemoryLog::new());
        persistence
            .persist_new_state(&[
                LogRecord::Doc(doc("a", 1.0)),
                LogRecord::Deleted("a".to_string()),
            ])
            .unwrap();

        let load = persistence.load().unwrap();
        assert!(load.docs.is_empty());
    }

    #[test]
    fn index_lifecycle_folds() {
        let mut persistence = plain(MemoryLog::new());
        persistence
            .persist_new_state(&[
                LogRecord::IndexCreated(IndexOptions::new("a")),
                LogRecord::IndexCreated(IndexOptions::new("b").unique(true)),
                LogRecord::IndexRemoved("a".to_string()),
            ])
            .unwrap();

        let load = persistence.load().unwrap();
        assert_eq!(load.indexes.len(), 1);
        assert!(load.indexes.get("b").unwrap().unique);
    }

    #[test]
    fn trailing_newline_is_not_corrupt() {
        let persistence = plain(MemoryLog::new());
        let load = persistence
            .treat_raw_data("{\"_id\":\"a\",\"n\":1}\n")
            .unwrap();
        assert_eq!(load.docs.len(), 1);

        assert!(persistence.treat_raw_data("").unwrap().docs.is_empty());
    }

    #[test]
    fn corruption_over_threshold_fails() {
        let persistence = plain(MemoryLog::new());
        let raw = "garbage\nmore garbage\n{\"_id\":\"a\"}\n";
        let err = persistence.treat_raw_data(raw).unwrap_err();
        assert!(matches!(err, CoreError::CorruptLog { .. }));
    }

    #[test]
    fn corruption_under_threshold_is_skipped() {
        let persistence = Persistence::new(Some(Box::new(MemoryLog::new())), None, None, 0.5)
            .unwrap();
        let raw = "garbage\n{\"_id\":\"a\"}\n{\"_id\":\"b\"}\n";
        let load = persistence.treat_raw_data(raw).unwrap();
        assert_eq!(load.docs.len(), 2);
    }

    #[test]
    fn compaction_writes_one_line_per_doc_and_index() {
        let log = MemoryLog::new();
        let mut persistence = plain(log);
        persistence
            .compact(
                &[doc("a", 1.0), doc("b", 2.0)],
                &[IndexOptions::new("n")],
            )
            .unwrap();

        let load = persistence.load().unwrap();
        assert_eq!(load.docs.len(), 2);
        assert_eq!(load.indexes.len(), 1);
    }

    #[test]
    fn inverse_hooks_round_trip() {
        let before: SerializationHook = Arc::new(|s: &str| format!("x{s}"));
        let after: SerializationHook = Arc::new(|s: &str| s[1..].to_string());
        let mut persistence =
            Persistence::new(Some(Box::new(MemoryLog::new())), Some(before), Some(after), 0.1)
                .unwrap();

        persistence
            .persist_new_state(&[LogRecord::Doc(doc("a", 1.0))])
            .unwrap();
        let load = persistence.load().unwrap();
        assert_eq!(load.docs.len(), 1);
    }

    #[test]
    fn lone_hook_is_rejected() {
        let before: SerializationHook = Arc::new(|s: &str| format!("x{s}"));
        let err = Persistence::new(Some(Box::new(MemoryLog::new())), Some(before), None, 0.1)
            .unwrap_err();
        assert!(matches!(err, CoreError::HookNotInvertible));
    }

    #[test]
    fn mismatched_hooks_are_rejected() {
        let before: SerializationHook = Arc::new(|s: &str| format!("ab{s}"));
        let after: SerializationHook = Arc::new(|s: &str| s[1..].to_string());
        let err =
            Persistence::new(Some(Box::new(MemoryLog::new())), Some(before), Some(after), 0.1)
                .unwrap_err();
        assert!(matches!(err, CoreError::HookNotInvertible));
    }

    #[test]
    fn in_memory_store_persists_nothing() {
        let mut persistence = Persistence::new(None, None, None, 0.1).unwrap();
        assert!(persistence.is_in_memory());
        persistence
            .persist_new_state(&[LogRecord::Doc(doc("a", 1.0))])
            .unwrap();
        assert!(!persistence.compact(&[], &[]).unwrap());
        assert!(persistence.load().unwrap().docs.is_empty());
    }
}
