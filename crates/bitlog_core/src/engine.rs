//! Engine facade.

use crate::config::Config;
use crate::dir::EngineDir;
use crate::error::{CoreError, CoreResult};
use crate::index::Index;
use crate::recovery::{self, RecoveryReport};
use crate::segment::{CompactionResult, Compactor, Segment, SegmentSet};
use crate::stats::{EngineStats, StatsSnapshot};
use crate::types::SegmentId;
use crate::writer::{WriteOp, Writer};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// State shared between the engine handle and the writer thread.
///
/// Lock order is always `segments` before `index`. The segment set is
/// `None` once the engine has closed and released its files.
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) dir: EngineDir,
    pub(crate) segments: RwLock<Option<SegmentSet>>,
    pub(crate) index: RwLock<Index>,
    pub(crate) stats: EngineStats,
}

impl Shared {
    /// Returns the active segment, or `EngineClosed` after close.
    pub(crate) fn active(&self) -> CoreResult<Arc<Segment>> {
        self.segments
            .read()
            .as_ref()
            .map(|segments| Arc::clone(&segments.active))
            .ok_or(CoreError::EngineClosed)
    }
}

/// Summary of one open segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentInfo {
    /// Segment id.
    pub id: SegmentId,
    /// Whether the segment is read-only.
    pub sealed: bool,
    /// Size in bytes.
    pub size: u64,
    /// Current file path.
    pub path: Option<PathBuf>,
}

/// The main engine handle.
///
/// `Engine` is the entry point of a bitlog store. It provides:
/// - Point reads, puts and deletes with last-writer-wins semantics
/// - Durability of every acknowledged write (with `sync_on_write`)
/// - Recovery from crashes at open
/// - Online compaction of sealed segments
///
/// Reads run concurrently on any thread. Writes from any thread are
/// funnelled through one writer thread and applied in submission order.
///
/// # Opening a Store
///
/// ```rust,ignore
/// use bitlog_core::{Config, Engine};
/// use std::path::Path;
///
/// let engine = Engine::open_with_config(
///     Path::new("data"),
///     Config::default().max_segment_size(1024 * 1024),
/// )?;
/// engine.put(b"k", b"v")?;
/// engine.close()?;
/// ```
///
/// The directory stays locked until the engine is closed or dropped.
pub struct Engine {
    shared: Arc<Shared>,
    writer: Writer,
    compaction: Mutex<()>,
    recovery: RecoveryReport,
    is_open: RwLock<bool>,
}

impl Engine {
    /// Opens a store with default configuration.
    ///
    /// # Errors
    ///
    /// - `DatabaseLocked` if another engine has the directory open
    /// - `InvalidFormat` if the directory holds an impossible segment layout
    /// - `CorruptSegment` if a sealed segment cannot be fully decoded
    /// - I/O errors
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens a store with custom configuration.
    pub fn open_with_config(path: &Path, config: Config) -> CoreResult<Self> {
        let dir = EngineDir::open(path, config.create_if_missing)?;
        let recovered = recovery::recover(&dir)?;

        info!(
            path = %path.display(),
            sealed = recovered.report.sealed_segments,
            active = %recovered.report.active_segment,
            keys = recovered.index.len(),
            records = recovered.report.records_replayed,
            "opened store"
        );

        let shared = Arc::new(Shared {
            config,
            dir,
            segments: RwLock::new(Some(recovered.segments)),
            index: RwLock::new(recovered.index),
            stats: EngineStats::new(),
        });
        let writer = Writer::spawn(Arc::clone(&shared))?;

        Ok(Self {
            shared,
            writer,
            compaction: Mutex::new(()),
            recovery: recovered.report,
            is_open: RwLock::new(true),
        })
    }

    /// Returns the latest value for `key`, or `None` if it is absent or
    /// deleted.
    pub fn get(&self, key: &[u8]) -> CoreResult<Option<Vec<u8>>> {
        self.ensure_open()?;

        let located = {
            let segments = self.shared.segments.read();
            let segments = segments.as_ref().ok_or(CoreError::EngineClosed)?;
            let index = self.shared.index.read();
            match index.lookup(key) {
                Some(entry) => {
                    let segment = segments.get(entry.segment_id).ok_or_else(|| {
                        CoreError::invalid_format(format!(
                            "index references unknown segment {}",
                            entry.segment_id
                        ))
                    })?;
                    Some((segment, entry))
                }
                None => None,
            }
        };

        let Some((segment, entry)) = located else {
            self.shared.stats.record_miss();
            return Ok(None);
        };

        let (record, _) = segment.read_at(entry.offset)?;
        if record.key != key || record.is_tombstone() {
            return Err(CoreError::corrupt_segment(
                segment.id(),
                format!("record at offset {} does not hold the indexed key", entry.offset),
            ));
        }

        self.shared.stats.record_read(record.value.len() as u64);
        Ok(Some(record.value))
    }

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// Returns once the record is appended, synced when `sync_on_write` is
    /// set, and indexed. Readers never see a write whose sync failed.
    pub fn put(&self, key: &[u8], value: &[u8]) -> CoreResult<()> {
        self.ensure_open()?;
        self.writer.submit(WriteOp::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        })
    }

    /// Deletes `key` by appending a tombstone.
    pub fn delete(&self, key: &[u8]) -> CoreResult<()> {
        self.ensure_open()?;
        self.writer.submit(WriteOp::Delete { key: key.to_vec() })
    }

    /// Returns the size of the active segment in bytes.
    pub fn size(&self) -> CoreResult<u64> {
        self.ensure_open()?;
        self.shared.active()?.size()
    }

    /// Returns whether `key` has a live value.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        self.shared.index.read().lookup(key).is_some()
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.index.read().len()
    }

    /// Returns true if no key is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.index.read().is_empty()
    }

    /// Merges every sealed segment into one.
    ///
    /// Writes and reads continue while the merge runs. The active segment
    /// is never touched, and segments sealed during the merge are left for
    /// the next compaction. Concurrent calls run one at a time.
    ///
    /// Returns a no-op result when there are no sealed segments, or only
    /// the output of a previous compaction.
    pub fn compact(&self) -> CoreResult<CompactionResult> {
        self.ensure_open()?;
        let _running = self.compaction.lock();
        let shared = &self.shared;

        let (inputs, active_id) = {
            let segments = shared.segments.read();
            let segments = segments.as_ref().ok_or(CoreError::EngineClosed)?;
            (segments.sealed_snapshot(), segments.active.id())
        };

        let Some(newest) = inputs.last().map(|s| s.id()) else {
            return Ok(CompactionResult::default());
        };
        if inputs.len() == 1 && newest.is_compaction_output() {
            return Ok(CompactionResult::default());
        }

        let output_id = newest.compaction_output();
        if output_id >= active_id {
            return Err(CoreError::invalid_format(format!(
                "compaction output {output_id} would not precede active segment {active_id}"
            )));
        }

        info!(inputs = inputs.len(), output = %output_id, "starting compaction");

        let staging = Segment::create_staging(output_id, &shared.dir.staging_path())?;
        let merged = Compactor::new()
            .merge(&inputs, &staging)
            .and_then(|merged| {
                staging.seal(&shared.dir.sealed_path(output_id))?;
                shared.dir.sync()?;
                Ok(merged)
            });
        let merged = match merged {
            Ok(merged) => merged,
            Err(e) => {
                drop(staging);
                if let Err(cleanup) = shared.dir.remove_staging() {
                    warn!(error = %cleanup, "failed to remove compaction staging file");
                }
                return Err(e);
            }
        };

        let ids: BTreeSet<SegmentId> = inputs.iter().map(|s| s.id()).collect();
        let output = Arc::new(staging);
        {
            let mut segments = shared.segments.write();
            let segments = segments.as_mut().ok_or(CoreError::EngineClosed)?;
            let mut index = shared.index.write();
            for id in &ids {
                segments.sealed.remove(id);
            }
            segments.sealed.insert(output_id, Arc::clone(&output));
            index.rebuild_range(&ids, &merged.relocations, output_id);
        }

        for segment in &inputs {
            if let Err(e) = segment.remove() {
                warn!(segment = %segment.id(), error = %e, "failed to remove compacted segment");
            }
        }
        if let Err(e) = shared.dir.sync() {
            warn!(error = %e, "failed to sync directory after compaction");
        }

        shared.stats.record_compaction();
        let mut result = merged.result;
        result.output_segment = Some(output_id);
        info!(
            output = %output_id,
            input_records = result.input_records,
            output_records = result.output_records,
            bytes_saved = result.bytes_saved(),
            "compaction finished"
        );
        Ok(result)
    }

    /// Lists every open segment in ascending id order.
    pub fn segments(&self) -> CoreResult<Vec<SegmentInfo>> {
        let segments: Vec<_> = match self.shared.segments.read().as_ref() {
            Some(segments) => segments.iter().cloned().collect(),
            None => return Err(CoreError::EngineClosed),
        };
        segments
            .iter()
            .map(|segment| {
                Ok(SegmentInfo {
                    id: segment.id(),
                    sealed: segment.is_sealed(),
                    size: segment.size()?,
                    path: segment.path(),
                })
            })
            .collect()
    }

    /// Returns a snapshot of the engine counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Returns what recovery did when this engine opened.
    #[must_use]
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.shared.dir.path()
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Stops the writer after draining queued writes, syncs the active
    /// segment and releases every segment file and the directory lock.
    /// Later operations fail with `EngineClosed`, and the directory can be
    /// opened again without dropping this handle.
    ///
    /// Closing twice is a no-op.
    pub fn close(&self) -> CoreResult<()> {
        let mut is_open = self.is_open.write();
        if !*is_open {
            return Ok(());
        }
        let _running = self.compaction.lock();

        self.writer.stop();
        *is_open = false;
        let released = self.shared.segments.write().take();
        let synced = match &released {
            Some(segments) => segments.active.sync(),
            None => Ok(()),
        };
        // Readers still holding a segment keep its file open until they finish.
        drop(released);
        self.shared.dir.unlock();
        synced?;

        info!(path = %self.path().display(), "closed store");
        Ok(())
    }

    /// Checks if the engine is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.is_open.read()
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if *self.is_open.read() {
            Ok(())
        } else {
            Err(CoreError::EngineClosed)
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("path", &self.path())
            .field("is_open", &self.is_open())
            .field("keys", &self.len())
            .finish_non_exhaustive()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to close store on drop");
        }
    }
}
