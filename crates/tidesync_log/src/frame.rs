//! Framed batch records.
//!
//! Every append call becomes one frame, so a batch is either entirely in the
//! segment or not at all:
//!
//! ```text
//! magic "TSLB" (4) | version u16 LE (2) | payload length u32 LE (4) | header CRC32 LE (4)
//! CBOR payload | frame CRC32 LE (4)
//! ```
//!
//! The header CRC covers the first ten bytes, so the length is never trusted
//! before it is checked. The frame CRC covers the header and the payload.
//! A frame whose intact header announces more bytes than the segment holds
//! was cut short by a crash and is seen as the end of the segment. Any
//! checksum mismatch is corruption.

use crate::backend::StorageBackend;
use crate::error::{LogError, LogResult};
use serde::{Deserialize, Serialize};
use tidesync_protocol::Change;
use uuid::Uuid;

/// Magic bytes opening every frame.
pub const FRAME_MAGIC: [u8; 4] = *b"TSLB";

/// Current frame format version.
pub const FRAME_VERSION: u16 = 1;

/// magic (4) + version (2) + length (4)
const HEADER_FIELDS: usize = 10;

/// Header fields + header CRC (4)
const HEADER_SIZE: usize = HEADER_FIELDS + 4;

const CRC_SIZE: usize = 4;

/// The changes of one append call, all belonging to one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecord {
    /// Application owning the segment.
    pub app_id: Uuid,
    /// Sequenced changes, in submission order.
    pub changes: Vec<Change>,
}

impl BatchRecord {
    /// Encodes the batch as a complete frame.
    pub fn encode(&self) -> LogResult<Vec<u8>> {
        let mut payload = Vec::new();
        ciborium::into_writer(self, &mut payload).map_err(|e| LogError::Codec(e.to_string()))?;

        let len = u32::try_from(payload.len())
            .map_err(|_| LogError::Codec("batch payload exceeds 4 GiB".into()))?;

        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        data.extend_from_slice(&FRAME_MAGIC);
        data.extend_from_slice(&FRAME_VERSION.to_le_bytes());
        data.extend_from_slice(&len.to_le_bytes());
        let header_crc = compute_crc32(&data);
        data.extend_from_slice(&header_crc.to_le_bytes());
        data.extend_from_slice(&payload);

        let crc = compute_crc32(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        Ok(data)
    }
}

/// Iterates the frames of one segment, front to back.
///
/// Yields `(offset, batch)` pairs. Iteration stops quietly at a truncated
/// frame; [`FrameReader::valid_end`] then tells where the intact prefix ends.
pub struct FrameReader<'a> {
    backend: &'a dyn StorageBackend,
    segment: String,
    offset: u64,
    size: u64,
    finished: bool,
}

impl<'a> FrameReader<'a> {
    /// Starts reading `backend` from offset 0. `segment` names it in errors.
    pub fn new(backend: &'a dyn StorageBackend, segment: impl Into<String>) -> LogResult<Self> {
        let size = backend.size()?;
        Ok(Self {
            backend,
            segment: segment.into(),
            offset: 0,
            size,
            finished: false,
        })
    }

    /// Offset just past the last intact frame read so far.
    pub fn valid_end(&self) -> u64 {
        self.offset
    }

    /// Size of the segment when the reader was created.
    pub fn segment_size(&self) -> u64 {
        self.size
    }

    fn corrupted(&self, message: &str) -> LogError {
        LogError::corrupted(self.segment.clone(), self.offset, message)
    }

    fn read_frame(&mut self) -> LogResult<Option<BatchRecord>> {
        let remaining = self.size - self.offset;
        if remaining < HEADER_SIZE as u64 {
            return Ok(None);
        }

        let header = self.backend.read_at(self.offset, HEADER_SIZE)?;
        if header[0..4] != FRAME_MAGIC {
            return Err(self.corrupted("bad frame magic"));
        }

        let header_crc = u32::from_le_bytes([header[10], header[11], header[12], header[13]]);
        if compute_crc32(&header[..HEADER_FIELDS]) != header_crc {
            return Err(self.corrupted("frame header checksum mismatch"));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != FRAME_VERSION {
            return Err(self.corrupted(&format!("unsupported frame version {version}")));
        }

        let len = u32::from_le_bytes([header[6], header[7], header[8], header[9]]) as usize;
        let total = (HEADER_SIZE + len + CRC_SIZE) as u64;
        if remaining < total {
            return Ok(None);
        }

        let body = self
            .backend
            .read_at(self.offset + HEADER_SIZE as u64, len + CRC_SIZE)?;
        let (payload, crc_bytes) = body.split_at(len);

        let mut covered = header;
        covered.extend_from_slice(payload);
        let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        if compute_crc32(&covered) != stored {
            return Err(self.corrupted("frame checksum mismatch"));
        }

        let batch: BatchRecord = ciborium::from_reader(payload)
            .map_err(|e| self.corrupted(&format!("undecodable batch: {e}")))?;

        self.offset += total;
        Ok(Some(batch))
    }
}

impl Iterator for FrameReader<'_> {
    type Item = LogResult<(u64, BatchRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let start = self.offset;
        match self.read_frame() {
            Ok(Some(batch)) => Some(Ok((start, batch))),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// CRC32 (IEEE polynomial).
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut bit = 0;
            while bit < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                bit += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        crc = (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize];
    }
    !crc
}
