//! Datastore configuration.

use crate::persistence::SerializationHook;
use quill_codec::StringComparator;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Configuration for opening a datastore.
#[derive(Clone, Default)]
pub struct DataStoreOptions {
    /// Datafile path; absent means in-memory only.
    pub(crate) filename: Option<PathBuf>,

    /// Force in-memory operation regardless of filename.
    pub(crate) in_memory_only: bool,

    /// Load the database as part of construction.
    pub(crate) autoload: bool,

    /// Maintain `createdAt` / `updatedAt` on documents.
    pub(crate) timestamp_data: bool,

    /// Load abort ratio for unreadable lines; `None` uses the default.
    pub(crate) corrupt_alert_threshold: Option<f64>,

    /// String comparator override for indexes and sorting.
    pub(crate) compare_strings: Option<Arc<StringComparator>>,

    /// Hook applied to every line before it is written.
    pub(crate) before_serialization: Option<SerializationHook>,

    /// Hook applied to every line after it is read.
    pub(crate) after_serialization: Option<SerializationHook>,
}

/// Default fraction of unreadable lines tolerated at load.
pub(crate) const DEFAULT_CORRUPT_ALERT_THRESHOLD: f64 = 0.1;

impl DataStoreOptions {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the datafile path.
    #[must_use]
    pub fn filename(mut self, path: impl AsRef<Path>) -> Self {
        self.filename = Some(path.as_ref().to_path_buf());
        self
    }

    /// Forces in-memory operation.
    #[must_use]
    pub fn in_memory_only(mut self, value: bool) -> Self {
        self.in_memory_only = value;
        self
    }

    /// Loads the database synchronously during construction.
    #[must_use]
    pub fn autoload(mut self, value: bool) -> Self {
        self.autoload = value;
        self
    }

    /// Maintains `createdAt` / `updatedAt` timestamps on documents.
    #[must_use]
    pub fn timestamp_data(mut self, value: bool) -> Self {
        self.timestamp_data = value;
        self
    }

    /// Sets the load abort ratio for unreadable lines (default 0.1).
    #[must_use]
    pub fn corrupt_alert_threshold(mut self, ratio: f64) -> Self {
        self.corrupt_alert_threshold = Some(ratio);
        self
    }

    /// Overrides string ordering in indexes and sorts.
    #[must_use]
    pub fn compare_strings(mut self, comparator: Arc<StringComparator>) -> Self {
        self.compare_strings = Some(comparator);
        self
    }

    /// Installs the pre-write serialization hook.
    ///
    /// Must be paired with [`DataStoreOptions::after_serialization`]
    /// such that the composition is the identity; the pair is verified
    /// at open time.
    #[must_use]
    pub fn before_serialization(mut self, hook: SerializationHook) -> Self {
        self.before_serialization = Some(hook);
        self
    }

    /// Installs the post-read serialization hook.
    #[must_use]
    pub fn after_serialization(mut self, hook: SerializationHook) -> Self {
        self.after_serialization = Some(hook);
        self
    }
}

impl std::fmt::Debug for DataStoreOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStoreOptions")
            .field("filename", &self.filename)
            .field("in_memory_only", &self.in_memory_only)
            .field("autoload", &self.autoload)
            .field("timestamp_data", &self.timestamp_data)
            .field("corrupt_alert_threshold", &self.corrupt_alert_threshold)
            .finish_non_exhaustive()
    }
}
