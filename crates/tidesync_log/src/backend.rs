//! Byte-store trait behind every log segment.

use crate::error::StorageResult;

/// An append-only byte store holding one segment of the change log.
///
/// Backends do not interpret the bytes; framing belongs to [`crate::BatchRecord`].
///
/// # Invariants
///
/// - `append` returns the offset where the data starts
/// - `read_at` returns exactly the bytes previously appended at that offset
/// - after `sync` returns, all appended bytes survive process termination
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it was written at.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Returns the current size in bytes.
    fn size(&self) -> StorageResult<u64>;

    /// Makes all appended data durable.
    fn sync(&mut self) -> StorageResult<()>;

    /// Drops everything after `new_size`.
    ///
    /// Used to cut a torn frame off the tail of a segment.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
