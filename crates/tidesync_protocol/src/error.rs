//! Error types for protocol parsing.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while decoding protocol values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A change path did not have the `<record-id>/<property>` shape.
    ///
    /// The message is part of the wire contract and is sent to clients verbatim.
    #[error("Path is incorrectly formatted, should be formatted <guid>/property.name")]
    MalformedPath {
        /// The rejected path, kept for logging.
        path: String,
    },
}

impl ProtocolError {
    pub(crate) fn malformed_path(path: &str) -> Self {
        Self::MalformedPath {
            path: path.to_string(),
        }
    }
}
