//! # tidesync log
//!
//! The partitioned, tidemark-sequenced change log behind tidesync.
//!
//! Changes are partitioned by `(application, group)`. Each partition hands
//! out tidemarks 1, 2, 3, ... in arrival order, and readers page through a
//! partition with [`ChangeLog::after`] using the last tidemark they saw.
//!
//! ## Storage
//!
//! - [`StorageBackend`] is an opaque append-only byte store; [`InMemoryBackend`]
//!   and [`FileBackend`] implement it
//! - every append call is one CRC-checked frame ([`BatchRecord`]) in the
//!   segment of its application, so a batch is all-or-nothing
//! - [`ChangeStore::open`] replays the segments of a [`LogDir`] and cuts off a
//!   torn final frame
//!
//! ## Example
//!
//! ```rust
//! use chrono::Utc;
//! use tidesync_log::{ChangeLog, ChangeStore};
//! use tidesync_protocol::{NewChange, PartitionKey, RecordPath};
//! use uuid::Uuid;
//!
//! let store = ChangeStore::in_memory();
//! let key = PartitionKey::new(Uuid::new_v4(), "people");
//! let change = NewChange::new("people", RecordPath::new(Uuid::new_v4(), "name"), Some("Neil".into()), Utc::now());
//!
//! let appended = store.append(&key, vec![change]).unwrap();
//! assert_eq!(appended[0].tidemark, 1);
//! assert_eq!(store.after(&key, None).unwrap().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod backend;
mod config;
mod dir;
mod error;
mod file;
mod frame;
mod memory;
mod store;

pub use backend::StorageBackend;
pub use config::{LogConfig, PAGE_SIZE};
pub use dir::LogDir;
pub use error::{LogError, LogResult, StorageError, StorageResult};
pub use file::FileBackend;
pub use frame::{compute_crc32, BatchRecord, FrameReader, FRAME_MAGIC, FRAME_VERSION};
pub use memory::InMemoryBackend;
pub use store::{
    ChangeLog, ChangeStore, MemorySegments, PartitionSummary, SegmentProvider, VerifyReport,
};
