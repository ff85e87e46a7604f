//! On-disk integration scenarios: reload, compaction, crash recovery,
//! hooks, and TTL persistence.

use quill_core::{
    CoreError, DataStore, DataStoreOptions, IndexOptions, SerializationHook, UpdateOptions, Value,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn obj(pairs: Vec<(&str, Value)>) -> Value {
    Value::object(pairs)
}

fn non_blank_lines(path: &Path) -> usize {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .count()
}

#[test]
fn insert_and_find_with_regex() {
    let dir = tempdir().unwrap();
    let db = DataStore::open(dir.path().join("music.db")).unwrap();

    db.insert_many(vec![
        obj(vec![
            ("artist", Value::from("Hendrix")),
            ("title", Value::from("Hey Joe")),
        ]),
        obj(vec![
            ("artist", Value::from("Zeppelin")),
            ("title", Value::from("Kashmir")),
        ]),
    ])
    .unwrap();

    let hits = db
        .find(obj(vec![(
            "artist",
            obj(vec![("$regex", Value::from("Hen"))]),
        )]))
        .exec()
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits.docs()[0].get("title"), Some(&Value::from("Hey Joe")));
    assert!(hits.docs()[0].get("_id").is_some());
}

#[test]
fn reload_restores_the_live_set() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.db");

    {
        let db = DataStore::open(&path).unwrap();
        for n in [1.0, 2.0, 3.0] {
            db.insert(obj(vec![("n", Value::Number(n))])).unwrap();
        }
        db.update(
            obj(vec![("n", Value::Number(2.0))]),
            obj(vec![("$set", obj(vec![("n", Value::Number(20.0))]))]),
            UpdateOptions::default(),
        )
        .unwrap();
        db.remove(obj(vec![("n", Value::Number(3.0))]), false).unwrap();
    }

    let db = DataStore::open(&path).unwrap();
    assert_eq!(db.count(obj(vec![])).unwrap(), 2);
    assert_eq!(db.count(obj(vec![("n", Value::Number(20.0))])).unwrap(), 1);
    assert_eq!(db.count(obj(vec![("n", Value::Number(3.0))])).unwrap(), 0);
}

#[test]
fn load_is_idempotent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.db");

    let db = DataStore::open(&path).unwrap();
    db.insert(obj(vec![("n", Value::Number(1.0))])).unwrap();

    db.load_database().unwrap();
    db.load_database().unwrap();
    assert_eq!(db.count(obj(vec![])).unwrap(), 1);
}

#[test]
fn compaction_writes_one_line_per_live_doc_and_index() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.db");

    let db = DataStore::open(&path).unwrap();
    db.ensure_index(IndexOptions::new("n")).unwrap();
    for n in [1.0, 2.0, 3.0, 4.0] {
        db.insert(obj(vec![("n", Value::Number(n))])).unwrap();
    }
    // Churn: rewrite every doc once, delete one.
    db.update(
        obj(vec![]),
        obj(vec![("$set", obj(vec![("touched", Value::Bool(true))]))]),
        UpdateOptions {
            multi: true,
            ..UpdateOptions::default()
        },
    )
    .unwrap();
    db.remove(obj(vec![("n", Value::Number(4.0))]), false).unwrap();
    assert!(non_blank_lines(&path) > 4);

    let events = db.subscribe();
    db.compact().unwrap();

    // Exactly |live| + |secondary indexes| lines.
    assert_eq!(non_blank_lines(&path), 3 + 1);
    assert_eq!(events.recv().unwrap(), quill_core::DbEvent::CompactionDone);
}

#[test]
fn crash_before_rename_is_recovered_from_the_temp_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.db");
    let temp = dir.path().join("data.db~");

    {
        let db = DataStore::open(&path).unwrap();
        for n in [1.0, 2.0, 3.0] {
            db.insert(obj(vec![("n", Value::Number(n))])).unwrap();
        }
        db.compact().unwrap();
    }

    // Simulate dying after the temp file was made durable but before
    // the rename completed: the new content sits in `data.db~` and the
    // main file is gone.
    fs::rename(&path, &temp).unwrap();
    assert!(!path.exists());

    let db = DataStore::open(&path).unwrap();
    assert_eq!(db.count(obj(vec![])).unwrap(), 3);
    assert!(!temp.exists());
}

#[test]
fn crash_before_temp_fsync_keeps_the_old_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.db");

    {
        let db = DataStore::open(&path).unwrap();
        db.insert(obj(vec![("n", Value::Number(1.0))])).unwrap();
    }

    // A half-written temp file must lose to an intact main file.
    fs::write(dir.path().join("data.db~"), "half a reco").unwrap();

    let db = DataStore::open(&path).unwrap();
    assert_eq!(db.count(obj(vec![])).unwrap(), 1);
}

#[test]
fn index_declarations_survive_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.db");

    {
        let db = DataStore::open(&path).unwrap();
        db.ensure_index(IndexOptions::new("k").unique(true)).unwrap();
        db.insert(obj(vec![("k", Value::Number(1.0))])).unwrap();
    }

    let db = DataStore::open(&path).unwrap();
    let err = db.insert(obj(vec![("k", Value::Number(1.0))])).unwrap_err();
    assert!(matches!(err, CoreError::UniqueViolated { .. }));
}

#[test]
fn removed_index_stays_removed_after_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.db");

    {
        let db = DataStore::open(&path).unwrap();
        db.ensure_index(IndexOptions::new("k").unique(true)).unwrap();
        db.insert(obj(vec![("k", Value::Number(1.0))])).unwrap();
        db.remove_index("k").unwrap();
    }

    let db = DataStore::open(&path).unwrap();
    // No unique constraint anymore.
    db.insert(obj(vec![("k", Value::Number(1.0))])).unwrap();
    assert_eq!(db.count(obj(vec![])).unwrap(), 2);
}

#[test]
fn conflicting_log_fails_load_with_empty_indexes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.db");

    // A log declaring a unique index over conflicting documents.
    fs::write(
        &path,
        concat!(
            "{\"$$indexCreated\":{\"fieldName\":\"k\",\"unique\":true,\"sparse\":false}}\n",
            "{\"_id\":\"aaaaaaaaaaaaaaaa\",\"k\":1}\n",
            "{\"_id\":\"bbbbbbbbbbbbbbbb\",\"k\":1}\n",
        ),
    )
    .unwrap();

    let err = DataStore::open(&path).unwrap_err();
    assert!(matches!(err, CoreError::UniqueViolated { .. }));
}

#[test]
fn ttl_eviction_appends_a_tombstone() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.db");

    let db = DataStore::open(&path).unwrap();
    db.ensure_index(IndexOptions::new("exp").expire_after_seconds(1))
        .unwrap();

    let stale = chrono::Utc::now() - chrono::Duration::seconds(5);
    db.insert(obj(vec![("exp", Value::DateTime(stale))])).unwrap();

    assert!(db.find(obj(vec![])).exec().unwrap().is_empty());
    assert!(fs::read_to_string(&path).unwrap().contains("$$deleted"));

    // The eviction is durable.
    drop(db);
    let db = DataStore::open(&path).unwrap();
    assert_eq!(db.count(obj(vec![])).unwrap(), 0);
}

#[test]
fn serialization_hooks_round_trip_the_datafile() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.db");

    let before: SerializationHook = Arc::new(|line: &str| format!("{line}!"));
    let after: SerializationHook =
        Arc::new(|line: &str| line.strip_suffix('!').unwrap_or(line).to_string());

    {
        let db = DataStore::open_with_options(
            DataStoreOptions::new()
                .filename(&path)
                .autoload(true)
                .before_serialization(before.clone())
                .after_serialization(after.clone()),
        )
        .unwrap();
        db.insert(obj(vec![("n", Value::Number(1.0))])).unwrap();
    }

    // The raw file is not plain JSON lines.
    assert!(fs::read_to_string(&path).unwrap().contains('!'));

    let db = DataStore::open_with_options(
        DataStoreOptions::new()
            .filename(&path)
            .autoload(true)
            .before_serialization(before)
            .after_serialization(after),
    )
    .unwrap();
    assert_eq!(db.count(obj(vec![])).unwrap(), 1);
}

#[test]
fn lone_serialization_hook_fails_construction() {
    let dir = tempdir().unwrap();
    let before: SerializationHook = Arc::new(|line: &str| format!("{line}!"));

    let err = DataStore::open_with_options(
        DataStoreOptions::new()
            .filename(dir.path().join("data.db"))
            .autoload(true)
            .before_serialization(before),
    )
    .unwrap_err();
    assert!(matches!(err, CoreError::HookNotInvertible));
}

#[test]
fn garbage_datafile_aborts_the_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.db");
    fs::write(&path, "not a record\nalso not a record\n").unwrap();

    let err = DataStore::open(&path).unwrap_err();
    assert!(matches!(err, CoreError::CorruptLog { .. }));
}

#[test]
fn corruption_under_the_threshold_is_tolerated() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.db");

    let mut lines = String::from("garbage\n");
    for i in 0..20 {
        lines.push_str(&format!("{{\"_id\":\"doc{i:013}\",\"n\":{i}}}\n"));
    }
    fs::write(&path, lines).unwrap();

    let db = DataStore::open(&path).unwrap();
    assert_eq!(db.count(obj(vec![])).unwrap(), 20);
}

#[test]
fn datafile_name_ending_in_tilde_is_rejected() {
    let dir = tempdir().unwrap();
    let err = DataStore::open(dir.path().join("data.db~")).unwrap_err();
    assert!(matches!(err, CoreError::InvalidOperation { .. }));
}

#[test]
fn explicit_load_after_deferred_open() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.db");

    {
        let db = DataStore::open(&path).unwrap();
        db.insert(obj(vec![("n", Value::Number(1.0))])).unwrap();
    }

    let db = DataStore::open_with_options(
        DataStoreOptions::new().filename(&path).autoload(false),
    )
    .unwrap();
    db.load_database().unwrap();
    assert_eq!(db.count(obj(vec![])).unwrap(), 1);
}

#[test]
fn operations_buffered_before_load_run_after_it() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.db");

    let db = DataStore::open_with_options(
        DataStoreOptions::new().filename(&path).autoload(false),
    )
    .unwrap();

    let writer = {
        let db = db.clone();
        std::thread::spawn(move || db.insert(obj(vec![("n", Value::Number(1.0))])))
    };

    // The write parks until the load flips the executor to ready.
    std::thread::sleep(std::time::Duration::from_millis(50));
    db.load_database().unwrap();

    writer.join().unwrap().unwrap();
    assert_eq!(db.count(obj(vec![])).unwrap(), 1);
}

#[test]
fn autocompaction_can_be_scheduled_and_stopped() {
    let dir = tempdir().unwrap();
    let db = DataStore::open(dir.path().join("data.db")).unwrap();

    db.set_autocompaction_interval(std::time::Duration::from_millis(10));
    db.set_autocompaction_interval(std::time::Duration::from_secs(3600));
    db.stop_autocompaction();
    db.stop_autocompaction();
}

#[test]
fn upsert_persists_across_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.db");

    {
        let db = DataStore::open(&path).unwrap();
        db.update(
            obj(vec![("name", Value::from("x"))]),
            obj(vec![("$set", obj(vec![("v", Value::Number(1.0))]))]),
            UpdateOptions {
                upsert: true,
                ..UpdateOptions::default()
            },
        )
        .unwrap();
    }

    let db = DataStore::open(&path).unwrap();
    let doc = db.find_one(obj(vec![("name", Value::from("x"))])).unwrap().unwrap();
    assert_eq!(doc.get("v"), Some(&Value::Number(1.0)));
}
