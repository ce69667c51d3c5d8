//! The change log and its storage engine.
//!
//! [`ChangeStore`] keeps every partition in memory for reads and writes each
//! append call as one frame to the segment of its application. Opening a
//! store replays those segments.
//!
//! # Concurrency
//!
//! Each partition owns a writer lock holding its last assigned tidemark.
//! An append takes the writer locks of the partitions it touches, in key
//! order, and keeps them until the frame is durable and the changes are
//! published. Appends to disjoint partitions only meet on the segment
//! mutex of a shared application, and only for the write itself.
//!
//! Readers take a partition's entry lock briefly and never see a change
//! before its frame is durable.
//!
//! # Failed writes
//!
//! A failed append truncates the segment back to where the frame started.
//! If that truncation fails too, the frame may still sit in the segment
//! with tidemarks the store never published. The segment is then poisoned:
//! it refuses every later append until the log is reopened and the frame
//! is replayed or cut off by recovery.

use crate::backend::StorageBackend;
use crate::config::LogConfig;
use crate::dir::LogDir;
use crate::error::{LogError, LogResult, StorageResult};
use crate::file::FileBackend;
use crate::frame::{BatchRecord, FrameReader};
use crate::memory::InMemoryBackend;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tidesync_protocol::{Change, NewChange, PartitionKey, Tidemark};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Append and read access to partitioned changes.
pub trait ChangeLog: Send + Sync {
    /// Sequences and durably stores the changes of one application.
    ///
    /// Every change gets the next tidemark of its `(app_id, group)`
    /// partition, in input order. The batch is stored all-or-nothing; on
    /// error no tidemark is consumed and nothing becomes visible.
    fn append_batch(&self, app_id: Uuid, changes: Vec<NewChange>) -> LogResult<Vec<Change>>;

    /// Returns up to one page of changes with a tidemark above `since`,
    /// oldest first. `None` reads from the beginning.
    fn after(&self, key: &PartitionKey, since: Option<Tidemark>) -> LogResult<Vec<Change>>;

    /// Appends changes to a single partition.
    ///
    /// The group of every change is overwritten with the group of `key`.
    fn append(&self, key: &PartitionKey, changes: Vec<NewChange>) -> LogResult<Vec<Change>> {
        let changes = changes
            .into_iter()
            .map(|mut change| {
                change.group.clone_from(&key.group);
                change
            })
            .collect();
        self.append_batch(key.app_id, changes)
    }
}

impl<T: ChangeLog + ?Sized> ChangeLog for Arc<T> {
    fn append_batch(&self, app_id: Uuid, changes: Vec<NewChange>) -> LogResult<Vec<Change>> {
        (**self).append_batch(app_id, changes)
    }

    fn after(&self, key: &PartitionKey, since: Option<Tidemark>) -> LogResult<Vec<Change>> {
        (**self).after(key, since)
    }
}

/// Opens the segments a [`ChangeStore`] writes to.
pub trait SegmentProvider: Send + Sync {
    /// Opens (or creates) the segment of `app_id`.
    fn open_segment(&self, app_id: Uuid) -> LogResult<Box<dyn StorageBackend>>;

    /// Lists applications with an existing segment, to replay on open.
    fn existing(&self) -> LogResult<Vec<Uuid>>;
}

/// Segments kept in memory; nothing survives the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemorySegments;

impl SegmentProvider for MemorySegments {
    fn open_segment(&self, _app_id: Uuid) -> LogResult<Box<dyn StorageBackend>> {
        Ok(Box::new(InMemoryBackend::new()))
    }

    fn existing(&self) -> LogResult<Vec<Uuid>> {
        Ok(Vec::new())
    }
}

impl SegmentProvider for LogDir {
    fn open_segment(&self, app_id: Uuid) -> LogResult<Box<dyn StorageBackend>> {
        Ok(Box::new(FileBackend::open(&self.segment_path(app_id))?))
    }

    fn existing(&self) -> LogResult<Vec<Uuid>> {
        self.segment_ids()
    }
}

/// Summary of one partition, for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSummary {
    /// The partition.
    pub key: PartitionKey,
    /// Number of stored changes.
    pub count: usize,
    /// Highest assigned tidemark, if any change was stored.
    pub last_tidemark: Option<Tidemark>,
}

/// Result of [`ChangeStore::verify`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Segments checked.
    pub segments: usize,
    /// Frames read with a valid checksum.
    pub frames: usize,
    /// Changes contained in those frames.
    pub changes: usize,
}

struct Partition {
    /// Last assigned tidemark; 0 before the first append.
    writer: Mutex<Tidemark>,
    entries: RwLock<Vec<Change>>,
}

impl Partition {
    fn new() -> Self {
        Self {
            writer: Mutex::new(0),
            entries: RwLock::new(Vec::new()),
        }
    }
}

struct SegmentState {
    backend: Box<dyn StorageBackend>,
    /// Set when a failed write could not be rolled back.
    poisoned: bool,
}

type Segment = Arc<Mutex<SegmentState>>;

fn shared(backend: Box<dyn StorageBackend>) -> Segment {
    Arc::new(Mutex::new(SegmentState {
        backend,
        poisoned: false,
    }))
}

/// The tidemark-sequenced change store.
pub struct ChangeStore {
    config: LogConfig,
    provider: Box<dyn SegmentProvider>,
    partitions: RwLock<HashMap<PartitionKey, Arc<Partition>>>,
    segments: Mutex<HashMap<Uuid, Segment>>,
}

impl ChangeStore {
    /// Creates an empty in-memory store with default configuration.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::in_memory_with(LogConfig::default())
    }

    /// Creates an empty in-memory store.
    #[must_use]
    pub fn in_memory_with(config: LogConfig) -> Self {
        Self::empty(Box::new(MemorySegments), config)
    }

    /// Opens the store kept in the directory at `path`, replaying its segments.
    ///
    /// # Errors
    ///
    /// Fails if the directory is missing (and may not be created), is locked
    /// by another process, or holds a corrupted segment.
    pub fn open(path: &Path, config: LogConfig) -> LogResult<Self> {
        let dir = LogDir::open(path, config.create_if_missing)?;
        info!(path = %path.display(), "opening change log");
        Self::with_provider(Box::new(dir), config)
    }

    /// Builds a store over `provider`, replaying its existing segments.
    pub fn with_provider(provider: Box<dyn SegmentProvider>, config: LogConfig) -> LogResult<Self> {
        let store = Self::empty(provider, config);
        store.recover()?;
        Ok(store)
    }

    fn empty(provider: Box<dyn SegmentProvider>, config: LogConfig) -> Self {
        Self {
            config,
            provider,
            partitions: RwLock::new(HashMap::new()),
            segments: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Lists all partitions, sorted by key.
    #[must_use]
    pub fn partitions(&self) -> Vec<PartitionSummary> {
        let partitions: Vec<(PartitionKey, Arc<Partition>)> = self
            .partitions
            .read()
            .iter()
            .map(|(key, partition)| (key.clone(), Arc::clone(partition)))
            .collect();

        let mut summaries: Vec<PartitionSummary> = partitions
            .into_iter()
            .map(|(key, partition)| {
                let entries = partition.entries.read();
                PartitionSummary {
                    key,
                    count: entries.len(),
                    last_tidemark: entries.last().map(|change| change.tidemark),
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.key.cmp(&b.key));
        summaries
    }

    /// Re-reads every segment and checks each frame.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Corrupted`] at the first bad frame or trailing
    /// partial frame, and [`LogError::SegmentPoisoned`] for a segment whose
    /// failed write could not be rolled back.
    pub fn verify(&self) -> LogResult<VerifyReport> {
        let mut segments: Vec<(Uuid, Segment)> = self
            .segments
            .lock()
            .iter()
            .map(|(id, segment)| (*id, Arc::clone(segment)))
            .collect();
        segments.sort_by_key(|(id, _)| *id);

        let mut report = VerifyReport::default();
        for (app_id, segment) in segments {
            let state = segment.lock();
            if state.poisoned {
                return Err(LogError::SegmentPoisoned {
                    segment: app_id.to_string(),
                });
            }
            let mut reader = FrameReader::new(&*state.backend, app_id.to_string())?;
            for frame in reader.by_ref() {
                let (_, batch) = frame?;
                report.frames += 1;
                report.changes += batch.changes.len();
            }
            if reader.valid_end() < reader.segment_size() {
                return Err(LogError::corrupted(
                    app_id.to_string(),
                    reader.valid_end(),
                    "trailing partial frame",
                ));
            }
            report.segments += 1;
        }

        debug!(
            segments = report.segments,
            frames = report.frames,
            changes = report.changes,
            "verified change log"
        );
        Ok(report)
    }

    fn partition(&self, key: &PartitionKey) -> Arc<Partition> {
        if let Some(partition) = self.partitions.read().get(key) {
            return Arc::clone(partition);
        }
        let mut partitions = self.partitions.write();
        Arc::clone(
            partitions
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Partition::new())),
        )
    }

    fn segment(&self, app_id: Uuid) -> LogResult<Segment> {
        let mut segments = self.segments.lock();
        if let Some(segment) = segments.get(&app_id) {
            return Ok(Arc::clone(segment));
        }
        let segment = shared(self.provider.open_segment(app_id)?);
        segments.insert(app_id, Arc::clone(&segment));
        Ok(segment)
    }

    /// Writes `frame` to the segment of `app_id`, rolling the segment back
    /// to its previous size if the write or sync fails.
    fn write_frame(&self, app_id: Uuid, frame: &[u8]) -> LogResult<()> {
        let segment = self.segment(app_id)?;
        let mut state = segment.lock();
        if state.poisoned {
            return Err(LogError::SegmentPoisoned {
                segment: app_id.to_string(),
            });
        }
        let start = state.backend.size()?;

        if let Err(e) = append_durably(&mut *state.backend, frame, self.config.sync_on_write) {
            error!(%app_id, error = %e, "failed to append batch");
            if let Err(rollback) = state.backend.truncate(start) {
                error!(
                    %app_id,
                    offset = start,
                    error = %rollback,
                    "failed to roll back segment tail, refusing further appends"
                );
                state.poisoned = true;
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn recover(&self) -> LogResult<()> {
        let started = Instant::now();
        let mut frames = 0usize;
        let mut changes = 0usize;

        for app_id in self.provider.existing()? {
            let mut backend = self.provider.open_segment(app_id)?;

            let (batches, valid_end, size) = {
                let mut reader = FrameReader::new(&*backend, app_id.to_string())?;
                let mut batches = Vec::new();
                for frame in reader.by_ref() {
                    batches.push(frame?);
                }
                (batches, reader.valid_end(), reader.segment_size())
            };

            if valid_end < size {
                if self.config.read_only {
                    warn!(%app_id, valid_end, size, "torn frame at end of segment left in place");
                } else {
                    warn!(%app_id, valid_end, size, "truncating torn frame at end of segment");
                    backend.truncate(valid_end)?;
                }
            }

            for (offset, batch) in batches {
                frames += 1;
                changes += self.replay(app_id, offset, batch)?;
            }

            self.segments.lock().insert(app_id, shared(backend));
        }

        info!(
            frames,
            changes,
            partitions = self.partitions.read().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "recovered change log"
        );
        Ok(())
    }

    fn replay(&self, app_id: Uuid, offset: u64, batch: BatchRecord) -> LogResult<usize> {
        let segment = app_id.to_string();
        if batch.app_id != app_id {
            return Err(LogError::corrupted(segment, offset, "batch belongs to another application"));
        }

        let count = batch.changes.len();
        for change in batch.changes {
            if change.app_id != app_id {
                return Err(LogError::corrupted(segment, offset, "change belongs to another application"));
            }
            let partition = self.partition(&change.partition_key());
            let mut last = partition.writer.lock();
            if change.tidemark <= *last {
                return Err(LogError::corrupted(
                    segment,
                    offset,
                    format!(
                        "tidemark {} does not follow {} in group {}",
                        change.tidemark, *last, change.group
                    ),
                ));
            }
            *last = change.tidemark;
            partition.entries.write().push(change);
        }
        Ok(count)
    }
}

fn append_durably(backend: &mut dyn StorageBackend, frame: &[u8], sync: bool) -> StorageResult<()> {
    backend.append(frame)?;
    if sync {
        backend.sync()?;
    }
    Ok(())
}

impl ChangeLog for ChangeStore {
    fn append_batch(&self, app_id: Uuid, changes: Vec<NewChange>) -> LogResult<Vec<Change>> {
        if changes.is_empty() {
            return Ok(Vec::new());
        }
        if self.config.read_only {
            return Err(LogError::ReadOnly);
        }
        let started = Instant::now();

        // Input positions per partition; BTreeMap order is the lock order.
        let mut positions: BTreeMap<PartitionKey, Vec<usize>> = BTreeMap::new();
        for (index, change) in changes.iter().enumerate() {
            positions
                .entry(change.partition_key(app_id))
                .or_default()
                .push(index);
        }

        let partitions: Vec<Arc<Partition>> =
            positions.keys().map(|key| self.partition(key)).collect();
        let mut writers: Vec<MutexGuard<'_, Tidemark>> =
            partitions.iter().map(|partition| partition.writer.lock()).collect();

        let mut tidemarks: Vec<Tidemark> = vec![0; changes.len()];
        for (writer, indices) in writers.iter().zip(positions.values()) {
            for (step, &index) in (1..).zip(indices) {
                tidemarks[index] = **writer + step;
            }
        }

        let record = BatchRecord {
            app_id,
            changes: changes
                .into_iter()
                .zip(tidemarks)
                .map(|(change, tidemark)| change.sequence(app_id, tidemark))
                .collect(),
        };
        self.write_frame(app_id, &record.encode()?)?;

        let sequenced = record.changes;
        for ((partition, writer), indices) in partitions
            .iter()
            .zip(writers.iter_mut())
            .zip(positions.values())
        {
            let mut entries = partition.entries.write();
            for &index in indices {
                entries.push(sequenced[index].clone());
            }
            if let Some(&last) = indices.last() {
                **writer = sequenced[last].tidemark;
            }
        }
        drop(writers);

        info!(
            %app_id,
            count = sequenced.len(),
            partitions = positions.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "appended changes"
        );
        Ok(sequenced)
    }

    fn after(&self, key: &PartitionKey, since: Option<Tidemark>) -> LogResult<Vec<Change>> {
        let started = Instant::now();
        match since {
            Some(tidemark) => debug!(partition = %key, tidemark, "getting changes after tidemark"),
            None => debug!(partition = %key, "getting all changes"),
        }

        let partition = self.partitions.read().get(key).cloned();
        let page: Vec<Change> = match partition {
            Some(partition) => {
                let entries = partition.entries.read();
                let floor = since.unwrap_or(0);
                let start = entries.partition_point(|change| change.tidemark <= floor);
                entries[start..]
                    .iter()
                    .take(self.config.page_size)
                    .cloned()
                    .collect()
            }
            None => Vec::new(),
        };

        info!(
            partition = %key,
            count = page.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "retrieved changes"
        );
        Ok(page)
    }
}
