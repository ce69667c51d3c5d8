//! Error types for the change log.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for byte-store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for change log operations.
pub type LogResult<T> = Result<T, LogError>;

/// Errors raised by a [`crate::StorageBackend`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of the segment.
    #[error("read beyond end of segment: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current segment size.
        size: u64,
    },

    /// Attempted to grow a segment through truncation.
    #[error("cannot truncate segment of {size} bytes to {requested} bytes")]
    TruncateBeyondEnd {
        /// The requested size.
        requested: u64,
        /// The current size.
        size: u64,
    },
}

/// Errors raised by the change log.
#[derive(Debug, Error)]
pub enum LogError {
    /// The underlying byte store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Filesystem error outside a segment (directory, lock file).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A segment contains bytes that are not a valid frame.
    #[error("segment {segment} corrupted at offset {offset}: {message}")]
    Corrupted {
        /// Segment name (application id).
        segment: String,
        /// Offset of the bad frame.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// A batch could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// Another process holds the log directory.
    #[error("log directory is locked by another process: {}", .0.display())]
    Locked(PathBuf),

    /// An append was attempted on a log opened read-only.
    #[error("change log is open read-only")]
    ReadOnly,

    /// A failed write could not be rolled back; the segment refuses
    /// appends until the log is reopened.
    #[error("segment {segment} has an unreconciled tail after a failed write; reopen the log")]
    SegmentPoisoned {
        /// Segment name (application id).
        segment: String,
    },

    /// The log directory does not exist and creation was not requested.
    #[error("log directory does not exist: {}", .0.display())]
    MissingDirectory(PathBuf),
}

impl LogError {
    pub(crate) fn corrupted(segment: impl Into<String>, offset: u64, message: impl Into<String>) -> Self {
        Self::Corrupted {
            segment: segment.into(),
            offset,
            message: message.into(),
        }
    }
}
