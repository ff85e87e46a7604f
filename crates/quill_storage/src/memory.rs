//! In-memory log storage for testing.

use crate::error::StorageResult;
use crate::log::LogStorage;

/// An in-memory log.
///
/// Useful for unit tests and crash simulations: the content can be
/// seeded with [`MemoryLog::with_data`] and inspected with
/// [`MemoryLog::data`].
#[derive(Debug, Default)]
pub struct MemoryLog {
    data: String,
}

impl MemoryLog {
    /// Creates a new empty in-memory log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an in-memory log with pre-existing content.
    ///
    /// Useful for testing load and recovery scenarios.
    #[must_use]
    pub fn with_data(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }

    /// Returns a copy of the log content.
    #[must_use]
    pub fn data(&self) -> String {
        self.data.clone()
    }
}

impl LogStorage for MemoryLog {
    fn ensure_integrity(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn read_all(&mut self) -> StorageResult<String> {
        Ok(self.data.clone())
    }

    fn append(&mut self, data: &str) -> StorageResult<()> {
        self.data.push_str(data);
        Ok(())
    }

    fn rewrite(&mut self, data: &str) -> StorageResult<()> {
        self.data = data.to_string();
        Ok(())
    }
}
