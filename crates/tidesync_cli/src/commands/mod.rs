//! CLI command implementations.

pub mod dump;
pub mod inspect;
pub mod sync;
pub mod verify;

use std::path::Path;
use tidesync_log::{ChangeStore, LogConfig};

/// Opens an existing change log for inspection.
///
/// Nothing is created or repaired: a torn tail stays on disk for `verify`
/// to report.
fn open_read_only(path: &Path) -> Result<ChangeStore, Box<dyn std::error::Error>> {
    let config = LogConfig::default().create_if_missing(false).read_only(true);
    Ok(ChangeStore::open(path, config)?)
}
