//! Server configuration.

use std::path::PathBuf;
use tidesync_log::LogConfig;

/// Configuration for the sync server.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// Directory of the on-disk change log. `None` keeps the log in memory.
    pub log_dir: Option<PathBuf>,
    /// Change log settings.
    pub log: LogConfig,
}

impl ServerConfig {
    /// Creates a configuration for an in-memory log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the change log in `dir`.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Sets the change log settings.
    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    /// Sets the pull page size.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.log = self.log.page_size(size);
        self
    }
}
