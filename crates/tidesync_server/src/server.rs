//! Transport boundary.
//!
//! [`SyncServer`] takes raw request bodies, as an HTTP handler would receive
//! them, and answers with a status code and a response document.

use crate::auth::AuthGate;
use crate::clock::{Clock, SystemClock};
use crate::config::ServerConfig;
use crate::engine::SyncEngine;
use crate::error::SyncResult;
use std::sync::Arc;
use tidesync_log::{ChangeStore, LogResult};
use tidesync_protocol::{GroupResponse, SyncRequest, SyncResponse};
use tracing::{debug, info, warn};

/// Error returned for an empty request body.
pub const EMPTY_BODY_MESSAGE: &str = "A non-empty request body is required.";

/// Status and body of a sync reply.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReply {
    /// HTTP status code: 200, 400 or 500.
    pub status: u16,
    /// Response document.
    pub response: SyncResponse,
}

impl SyncReply {
    fn ok(response: SyncResponse) -> Self {
        Self {
            status: 200,
            response,
        }
    }

    fn failed(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            response: SyncResponse::error(message),
        }
    }

    /// Serializes the response document.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.response)
    }
}

impl From<SyncResult<Option<Vec<GroupResponse>>>> for SyncReply {
    fn from(result: SyncResult<Option<Vec<GroupResponse>>>) -> Self {
        match result {
            Ok(groups) => Self::ok(SyncResponse::success(groups)),
            Err(e) => Self::failed(e.status_code(), e.to_string()),
        }
    }
}

/// The sync server.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tidesync_server::{MemoryAuthGate, ServerConfig, SyncServer};
///
/// let server = SyncServer::open(ServerConfig::default(), Arc::new(MemoryAuthGate::new())).unwrap();
/// let reply = server.handle_body(b"");
/// assert_eq!(reply.status, 400);
/// ```
pub struct SyncServer {
    engine: SyncEngine<Arc<dyn AuthGate>, ChangeStore>,
}

impl SyncServer {
    /// Opens the change log described by `config` and serves requests over it.
    ///
    /// # Errors
    ///
    /// Fails if the on-disk log cannot be opened or replayed.
    pub fn open(config: ServerConfig, auth: Arc<dyn AuthGate>) -> LogResult<Self> {
        Self::open_with_clock(config, auth, Arc::new(SystemClock))
    }

    /// Like [`SyncServer::open`], with an explicit time source.
    pub fn open_with_clock(
        config: ServerConfig,
        auth: Arc<dyn AuthGate>,
        clock: Arc<dyn Clock>,
    ) -> LogResult<Self> {
        let log = match &config.log_dir {
            Some(dir) => ChangeStore::open(dir, config.log.clone())?,
            None => ChangeStore::in_memory_with(config.log.clone()),
        };
        info!(
            persistent = config.log_dir.is_some(),
            page_size = config.log.page_size,
            "sync server ready"
        );
        Ok(Self {
            engine: SyncEngine::with_clock(auth, log, clock),
        })
    }

    /// Returns the engine.
    pub fn engine(&self) -> &SyncEngine<Arc<dyn AuthGate>, ChangeStore> {
        &self.engine
    }

    /// Returns the change log.
    pub fn log(&self) -> &ChangeStore {
        self.engine.log()
    }

    /// Handles a raw JSON request body.
    ///
    /// An empty body is rejected before decoding. A body that does not
    /// decode is handled as an absent request.
    pub fn handle_body(&self, body: &[u8]) -> SyncReply {
        if body.iter().all(u8::is_ascii_whitespace) {
            warn!("empty sync request body");
            return SyncReply::failed(400, EMPTY_BODY_MESSAGE);
        }

        let request = match serde_json::from_slice::<SyncRequest>(body) {
            Ok(request) => Some(request),
            Err(e) => {
                debug!(error = %e, "undecodable sync request body");
                None
            }
        };
        self.handle_request(request.as_ref())
    }

    /// Handles a decoded request.
    pub fn handle_request(&self, request: Option<&SyncRequest>) -> SyncReply {
        SyncReply::from(self.engine.sync(request))
    }
}
