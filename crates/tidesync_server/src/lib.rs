//! # tidesync server
//!
//! The sync endpoint of tidesync.
//!
//! This crate provides:
//! - [`SyncEngine`], which validates a request, appends its changes and pulls
//!   its groups
//! - [`AuthGate`], the application and device lookup, with the in-memory
//!   [`MemoryAuthGate`] registry
//! - [`Clock`], the time source used to turn client-relative ages into
//!   timestamps
//! - [`SyncServer`], the transport boundary mapping bodies to status codes
//!
//! # Protocol
//!
//! A client sends its pending edits and, per group, the last tidemark it has
//! seen. The server appends the edits, then answers each group with up to one
//! page of changes after that tidemark and the tidemark to send next time.
//! Clients apply the page themselves, last write wins per path.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod clock;
mod config;
mod engine;
mod error;
mod server;

pub use auth::{Application, AuthGate, Device, MemoryAuthGate, Registry, RegistryError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ServerConfig;
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use server::{SyncReply, SyncServer, EMPTY_BODY_MESSAGE};
