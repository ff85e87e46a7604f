//! Log storage trait definition.

use crate::error::StorageResult;

/// A newline-delimited log store.
///
/// Log stores are **opaque text stores**. The engine owns all record
/// interpretation - a store only knows how to make the log readable,
/// append to it, and replace it wholesale in a crash-safe way.
///
/// # Invariants
///
/// - After `ensure_integrity` the log is readable (possibly empty)
/// - `append` is accepted-by-the-kernel durability; full durability is
///   only guaranteed per `rewrite`
/// - `rewrite` either leaves the previous content intact or fully
///   replaces it, never a mix
///
/// # Implementors
///
/// - [`super::FileLog`] - On-disk persistent storage
/// - [`super::MemoryLog`] - For tests and crash simulation
pub trait LogStorage: Send + Sync {
    /// Makes the log readable, recovering from an interrupted rewrite.
    ///
    /// # Errors
    ///
    /// Returns an error if recovery or creation fails.
    fn ensure_integrity(&mut self) -> StorageResult<()>;

    /// Reads the entire log.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    fn read_all(&mut self) -> StorageResult<String>;

    /// Appends raw text to the end of the log.
    ///
    /// Returns once the kernel has accepted the write; the data is not
    /// synced to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &str) -> StorageResult<()>;

    /// Replaces the whole log with `data`, crash-safely.
    ///
    /// After this returns, the new content is durable. If the process
    /// dies at any point during the call, a subsequent
    /// `ensure_integrity` restores either the old or the new content in
    /// full.
    ///
    /// # Errors
    ///
    /// Returns an error if any step of the rewrite fails.
    fn rewrite(&mut self, data: &str) -> StorageResult<()>;
}
