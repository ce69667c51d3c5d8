//! Change log configuration.

/// Maximum number of changes returned by one pull.
pub const PAGE_SIZE: usize = 50;

/// Configuration for opening a change log.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Maximum number of changes returned by [`crate::ChangeLog::after`].
    pub page_size: usize,

    /// Whether to sync the segment after every append (safer but slower).
    pub sync_on_write: bool,

    /// Whether to create the log directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Open for inspection only: torn tails are left in place and appends
    /// are refused.
    pub read_only: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            sync_on_write: true,
            create_if_missing: true,
            read_only: false,
        }
    }
}

impl LogConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pull page size. Zero is raised to one.
    #[must_use]
    pub const fn page_size(mut self, size: usize) -> Self {
        self.page_size = if size == 0 { 1 } else { size };
        self
    }

    /// Sets whether to sync after every append.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets whether to create the log directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether the log is opened for inspection only.
    #[must_use]
    pub const fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }
}
