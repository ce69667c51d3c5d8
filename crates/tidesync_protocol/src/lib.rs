//! # tidesync protocol
//!
//! Protocol types for tidesync.
//!
//! This crate provides:
//! - [`RecordPath`], the `<record-id>/<property>` path codec
//! - [`Change`] and [`NewChange`], the records stored in the change log
//! - [`PartitionKey`], the `(application, group)` partition of the log
//! - Wire messages ([`SyncRequest`], [`SyncResponse`]) in their JSON shape
//! - [`latest_per_path`], the client-side last-write-wins reduction
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod change;
mod error;
mod merge;
mod messages;
mod path;

pub use change::{Change, NewChange, PartitionKey, Tidemark};
pub use error::{ProtocolError, ProtocolResult};
pub use merge::latest_per_path;
pub use messages::{ChangeRequest, ChangeResponse, GroupRequest, GroupResponse, SyncRequest, SyncResponse};
pub use path::{RecordPath, PATH_SEPARATOR};
