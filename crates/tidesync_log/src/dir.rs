//! Log directory management.
//!
//! ```text
//! <log_dir>/
//! ├─ LOCK                    # Advisory lock for single-writer
//! └─ segments/
//!    ├─ <app_id>.log         # One segment per application
//!    └─ ...
//! ```
//!
//! The LOCK file ensures only one process appends to the log at a time.

use crate::error::{LogError, LogResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const LOCK_FILE: &str = "LOCK";
const SEGMENTS_DIR: &str = "segments";
const SEGMENT_EXTENSION: &str = "log";

/// Holds the log directory and its exclusive lock.
///
/// Only one `LogDir` can exist per directory at a time; the lock is released
/// when it is dropped.
#[derive(Debug)]
pub struct LogDir {
    path: PathBuf,
    _lock_file: File,
}

impl LogDir {
    /// Opens a log directory, creating it if allowed.
    ///
    /// # Errors
    ///
    /// - [`LogError::MissingDirectory`] if it doesn't exist and `create_if_missing` is false
    /// - [`LogError::Locked`] if another process holds the lock
    /// - I/O errors
    pub fn open(path: &Path, create_if_missing: bool) -> LogResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(LogError::MissingDirectory(path.to_path_buf()));
            }
        }

        if !path.is_dir() {
            return Err(LogError::MissingDirectory(path.to_path_buf()));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(LogError::Locked(path.to_path_buf()));
        }

        fs::create_dir_all(path.join(SEGMENTS_DIR))?;

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the log directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the directory holding the segment files.
    #[must_use]
    pub fn segments_dir(&self) -> PathBuf {
        self.path.join(SEGMENTS_DIR)
    }

    /// Returns the segment file of `app_id`.
    #[must_use]
    pub fn segment_path(&self, app_id: Uuid) -> PathBuf {
        self.segments_dir()
            .join(format!("{app_id}.{SEGMENT_EXTENSION}"))
    }

    /// Lists the applications that have a segment file, sorted.
    ///
    /// Files that are not named `<uuid>.log` are ignored.
    pub fn segment_ids(&self) -> LogResult<Vec<Uuid>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(self.segments_dir())? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SEGMENT_EXTENSION) {
                continue;
            }
            let id = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| Uuid::parse_str(stem).ok());
            if let Some(id) = id {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_layout() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("log");

        let dir = LogDir::open(&root, true).unwrap();
        assert!(root.join("LOCK").exists());
        assert!(dir.segments_dir().is_dir());
    }

    #[test]
    fn missing_directory_without_create() {
        let temp = tempdir().unwrap();
        let result = LogDir::open(&temp.path().join("absent"), false);
        assert!(matches!(result, Err(LogError::MissingDirectory(_))));
    }

    #[test]
    fn second_open_is_locked() {
        let temp = tempdir().unwrap();
        let _first = LogDir::open(temp.path(), true).unwrap();
        let second = LogDir::open(temp.path(), true);
        assert!(matches!(second, Err(LogError::Locked(_))));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        drop(LogDir::open(temp.path(), true).unwrap());
        assert!(LogDir::open(temp.path(), true).is_ok());
    }

    #[test]
    fn segment_ids_skip_foreign_files() {
        let temp = tempdir().unwrap();
        let dir = LogDir::open(temp.path(), true).unwrap();

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        File::create(dir.segment_path(a)).unwrap();
        File::create(dir.segment_path(b)).unwrap();
        File::create(dir.segments_dir().join("notes.txt")).unwrap();
        File::create(dir.segments_dir().join("not-a-uuid.log")).unwrap();

        let mut expected = vec![a, b];
        expected.sort_unstable();
        assert_eq!(dir.segment_ids().unwrap(), expected);
    }
}
