//! Crash recovery.
//!
//! Recovery runs once when an engine opens, before any other operation. It
//! turns whatever a crash left in the directory into a consistent segment
//! set and rebuilds the index by replaying every record in order.
//!
//! ## Rules
//!
//! 1. A leftover `compact.tmp` belongs to a compaction that never published
//!    and is deleted.
//! 2. Sealed segments with an id below the newest compaction output were
//!    merged into it. They are skipped and deleted.
//! 3. At most one active segment may exist and its id must be even and
//!    greater than every sealed id. Otherwise the directory is rejected.
//! 4. If no active segment exists, a new one is created.
//! 5. Sealed segments are replayed in ascending id order, then the active
//!    segment. A torn record at the end of the active segment is cut off,
//!    and so is a zero-filled tail left by preallocation. Any other decode
//!    failure is fatal.

use crate::dir::EngineDir;
use crate::error::{CoreError, CoreResult};
use crate::index::{Index, IndexEntry};
use crate::segment::{Segment, SegmentSet};
use crate::types::SegmentId;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What recovery found and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Sealed segments replayed.
    pub sealed_segments: usize,
    /// Id of the active segment after recovery.
    pub active_segment: SegmentId,
    /// Records replayed across all segments.
    pub records_replayed: u64,
    /// Tombstones among the replayed records.
    pub tombstones_replayed: u64,
    /// Bytes cut from the end of the active segment.
    pub truncated_bytes: u64,
    /// Whether a compaction staging file was discarded.
    pub removed_staging: bool,
    /// Merged segments left behind by a compaction, now deleted.
    pub superseded_segments: Vec<SegmentId>,
    /// Whether the active segment was created during this open.
    pub created_active: bool,
}

/// Per-segment replay counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ReplayStats {
    pub records: u64,
    pub tombstones: u64,
    /// Offset just past the last complete record.
    pub valid_len: u64,
    /// Bytes of a torn record after `valid_len`, if one was found.
    pub torn_bytes: Option<u64>,
}

/// Replays every record of `segment` into `index`.
///
/// With `allow_torn_tail`, a `TruncatedRecord` ends the replay and is
/// reported in the stats instead of failing. So does an undecodable record
/// when every byte from it to the end of the segment is zero. Every other
/// decode failure becomes `CorruptSegment`.
pub(crate) fn replay_segment(
    segment: &Segment,
    index: &mut Index,
    allow_torn_tail: bool,
) -> CoreResult<ReplayStats> {
    let mut stats = ReplayStats::default();
    let mut iter = segment.iter();
    let mut end = 0;

    for next in iter.by_ref() {
        match next {
            Ok(scanned) => {
                end = scanned.offset + scanned.len as u64;
                stats.records += 1;
                if scanned.record.is_tombstone() {
                    stats.tombstones += 1;
                }
                index.apply(
                    &scanned.record,
                    IndexEntry::new(segment.id(), scanned.offset, scanned.len as u64),
                );
            }
            Err(CoreError::TruncatedRecord { available, .. }) if allow_torn_tail => {
                stats.torn_bytes = Some(available);
                break;
            }
            Err(e @ (CoreError::MalformedRecord { .. } | CoreError::ChecksumMismatch { .. }))
                if allow_torn_tail =>
            {
                if !segment.is_zero_from(end)? {
                    return Err(e.in_segment(segment.id()));
                }
                stats.torn_bytes = Some(segment.size()?.saturating_sub(end));
                break;
            }
            Err(e) => return Err(e.in_segment(segment.id())),
        }
    }

    stats.valid_len = iter.offset();
    Ok(stats)
}

/// Engine state rebuilt from disk.
#[derive(Debug)]
pub(crate) struct Recovered {
    pub segments: SegmentSet,
    pub index: Index,
    pub report: RecoveryReport,
}

/// Recovers the segment set and index of a locked directory.
pub(crate) fn recover(dir: &EngineDir) -> CoreResult<Recovered> {
    let listing = dir.scan()?;
    let mut report = RecoveryReport::default();

    if listing.staging {
        warn!(path = %dir.staging_path().display(), "discarding unpublished compaction output");
        dir.remove_staging()?;
        report.removed_staging = true;
    }

    if listing.active.len() > 1 {
        return Err(CoreError::invalid_format(format!(
            "found {} active segments, expected at most one",
            listing.active.len()
        )));
    }

    let newest_output = listing
        .sealed
        .iter()
        .rev()
        .copied()
        .find(|id| id.is_compaction_output());
    let (superseded, live): (Vec<SegmentId>, Vec<SegmentId>) = listing
        .sealed
        .iter()
        .copied()
        .partition(|id| newest_output.is_some_and(|out| *id < out));

    for id in &superseded {
        let path = dir.sealed_path(*id);
        if let Err(e) = std::fs::remove_file(&path) {
            warn!(segment = %id, error = %e, "failed to remove merged segment");
        }
    }
    if !superseded.is_empty() {
        info!(count = superseded.len(), "removed segments already merged by compaction");
        dir.sync()?;
    }
    report.superseded_segments = superseded;

    let max_sealed = live.last().copied();
    let active_id = match listing.active.first().copied() {
        Some(id) => {
            if id.is_compaction_output() {
                return Err(CoreError::invalid_format(format!(
                    "active segment {id} has an odd id"
                )));
            }
            if max_sealed.is_some_and(|max| max >= id) {
                return Err(CoreError::invalid_format(format!(
                    "active segment {id} is not newer than every sealed segment"
                )));
            }
            id
        }
        None => {
            report.created_active = true;
            max_sealed.map_or(SegmentId::FIRST, SegmentId::next_active_after)
        }
    };

    let mut index = Index::new();
    let mut segments = SegmentSet::new(Arc::new(Segment::open_active(
        active_id,
        &dir.active_path(active_id),
    )?));
    if report.created_active {
        dir.sync()?;
    }

    for id in live {
        let segment = Segment::open_sealed(id, &dir.sealed_path(id))?;
        let stats = replay_segment(&segment, &mut index, false)?;
        debug!(segment = %id, records = stats.records, bytes = stats.valid_len, "replayed sealed segment");
        report.records_replayed += stats.records;
        report.tombstones_replayed += stats.tombstones;
        report.sealed_segments += 1;
        segments.sealed.insert(id, Arc::new(segment));
    }

    let active = Arc::clone(&segments.active);
    let stats = replay_segment(&active, &mut index, true)?;
    debug!(segment = %active_id, records = stats.records, bytes = stats.valid_len, "replayed active segment");
    report.records_replayed += stats.records;
    report.tombstones_replayed += stats.tombstones;

    if let Some(torn) = stats.torn_bytes {
        let size = active.size()?;
        warn!(
            segment = %active_id,
            offset = stats.valid_len,
            discarded = size - stats.valid_len,
            torn_record_bytes = torn,
            "truncating torn record at end of active segment"
        );
        active.truncate(stats.valid_len)?;
        active.sync()?;
        report.truncated_bytes = size - stats.valid_len;
    }

    report.active_segment = active_id;
    Ok(Recovered {
        segments,
        index,
        report,
    })
}
