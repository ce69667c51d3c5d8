//! Error types for the sync server.

use thiserror::Error;
use tidesync_log::LogError;
use tidesync_protocol::ProtocolError;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Reasons a sync request fails.
///
/// The messages of the validation variants are part of the wire contract
/// and are sent to clients verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The request is absent or carries no application id.
    #[error("app_id missing or invalid request")]
    InvalidRequest,

    /// No application is registered under the application id.
    #[error("No application found for app_id")]
    UnknownApplication,

    /// The access key is missing or does not match the application.
    #[error("app_api_access_key incorrect for app_id")]
    AccessDenied,

    /// A device id was given but is not registered.
    #[error("No device found for device_id")]
    UnknownDevice,

    /// A change path is not `<record-id>/<property>`.
    #[error("Path is incorrectly formatted, should be formatted <guid>/property.name")]
    MalformedPath {
        /// The rejected path.
        path: String,
    },

    /// The change log could not be read or written.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl SyncError {
    /// Returns true if the request itself is at fault (4xx).
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Returns true if the server failed (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, SyncError::StorageUnavailable(_))
    }

    /// HTTP status code a transport should answer with.
    pub fn status_code(&self) -> u16 {
        if self.is_server_error() {
            500
        } else {
            400
        }
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::MalformedPath { path } => SyncError::MalformedPath { path },
        }
    }
}

impl From<LogError> for SyncError {
    fn from(err: LogError) -> Self {
        SyncError::StorageUnavailable(err.to_string())
    }
}
