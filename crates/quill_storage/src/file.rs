//! File-based log storage.

use crate::error::{StorageError, StorageResult};
use crate::log::LogStorage;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Suffix of the temporary file used by crash-safe rewrites.
const TEMP_SUFFIX: &str = "~";

/// An on-disk log file.
///
/// Appends go straight to the log file without a sync; durability is
/// per-rewrite. A rewrite writes `<path>~`, syncs it, and renames it
/// over `<path>` with directory syncs on both sides of the rename, so a
/// crash at any point leaves a complete old or new log behind.
///
/// # Example
///
/// ```no_run
/// use quill_storage::{FileLog, LogStorage};
/// use std::path::Path;
///
/// let mut log = FileLog::new(Path::new("data.db"));
/// log.ensure_integrity().unwrap();
/// log.append("{\"a\":1}\n").unwrap();
/// ```
#[derive(Debug)]
pub struct FileLog {
    path: PathBuf,
    temp_path: PathBuf,
}

impl FileLog {
    /// Creates a log handle for the given path.
    ///
    /// No filesystem access happens until [`LogStorage::ensure_integrity`]
    /// is called.
    #[must_use]
    pub fn new(path: &Path) -> Self {
        let mut temp = path.as_os_str().to_owned();
        temp.push(TEMP_SUFFIX);
        Self {
            path: path.to_path_buf(),
            temp_path: PathBuf::from(temp),
        }
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Syncs the containing directory so a rename is durable.
    ///
    /// Directory fsync is not supported everywhere; on platforms without
    /// it this step is skipped.
    fn sync_dir(&self) -> StorageResult<()> {
        #[cfg(unix)]
        {
            if let Some(parent) = self.path.parent() {
                let dir = File::open(parent)
                    .map_err(|e| StorageError::io("open directory", e))?;
                dir.sync_all()
                    .map_err(|e| StorageError::io("sync directory", e))?;
            }
        }
        Ok(())
    }
}

impl LogStorage for FileLog {
    fn ensure_integrity(&mut self) -> StorageResult<()> {
        if self.path.exists() {
            return Ok(());
        }

        if self.temp_path.exists() {
            // Crash happened after the temp file was made durable but
            // before the rename; promote it.
            fs::rename(&self.temp_path, &self.path)
                .map_err(|e| StorageError::io("promote temp file", e))?;
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| StorageError::io("create directory", e))?;
            }
        }
        File::create(&self.path).map_err(|e| StorageError::io("create datafile", e))?;
        Ok(())
    }

    fn read_all(&mut self) -> StorageResult<String> {
        fs::read_to_string(&self.path).map_err(|e| StorageError::io("read datafile", e))
    }

    fn append(&mut self, data: &str) -> StorageResult<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| StorageError::io("open datafile", e))?;
        file.write_all(data.as_bytes())
            .map_err(|e| StorageError::io("append", e))
    }

    fn rewrite(&mut self, data: &str) -> StorageResult<()> {
        self.sync_dir()?;

        if self.path.exists() {
            let existing = File::open(&self.path)
                .map_err(|e| StorageError::io("open datafile", e))?;
            existing
                .sync_all()
                .map_err(|e| StorageError::io("sync datafile", e))?;
        }

        let mut temp = File::create(&self.temp_path)
            .map_err(|e| StorageError::io("create temp file", e))?;
        temp.write_all(data.as_bytes())
            .map_err(|e| StorageError::io("write temp file", e))?;
        temp.sync_all()
            .map_err(|e| StorageError::io("sync temp file", e))?;
        drop(temp);

        fs::rename(&self.temp_path, &self.path)
            .map_err(|e| StorageError::io("rename temp file", e))?;

        self.sync_dir()
    }
}
