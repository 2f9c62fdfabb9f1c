//! Segment compaction.
//!
//! Compaction merges sealed segments into one, keeping only the latest
//! value per key and dropping tombstones. This module provides the
//! [`Compactor`], which performs the merge into a staging segment; the
//! engine decides which segments to merge and publishes the result.
//!
//! ## Invariants
//!
//! - Compaction **MUST NOT** change logical state
//! - The last record per key across the inputs wins
//! - Output records are sorted by key, so equal inputs give equal output
//! - Inputs are only read, never modified

use crate::error::{CoreError, CoreResult};
use crate::segment::file::Segment;
use crate::types::SegmentId;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Result of a compaction operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompactionResult {
    /// Segments merged, in ascending id order.
    pub input_segments: Vec<SegmentId>,
    /// Number of records in the input.
    pub input_records: usize,
    /// Number of records in the output.
    pub output_records: usize,
    /// Number of tombstones removed.
    pub tombstones_removed: usize,
    /// Number of superseded values removed.
    pub obsolete_versions_removed: usize,
    /// Total size of the input segments.
    pub bytes_before: u64,
    /// Size of the output segment.
    pub bytes_after: u64,
    /// Segment that replaced the inputs, `None` if nothing was compacted.
    pub output_segment: Option<SegmentId>,
}

impl CompactionResult {
    /// Bytes reclaimed.
    #[must_use]
    pub fn bytes_saved(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }

    /// Returns true if the call found nothing to merge.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.output_segment.is_none()
    }
}

/// Output of [`Compactor::merge`].
#[derive(Debug)]
pub struct MergeOutput {
    /// `(old_segment, old_offset)` to offset in the staging segment.
    pub relocations: HashMap<(SegmentId, u64), u64>,
    /// Merge statistics, without `output_segment` set.
    pub result: CompactionResult,
}

/// Merges sealed segments into a staging segment.
///
/// ## Example
///
/// ```ignore
/// let staging = Segment::create_staging(output_id, &dir.staging_path())?;
/// let merged = Compactor::new().merge(&inputs, &staging)?;
/// ```
#[derive(Debug, Default)]
pub struct Compactor;

impl Compactor {
    /// Creates a compactor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Replays `inputs` in the given order, then writes every surviving
    /// value into `staging` sorted by key and syncs it.
    ///
    /// `inputs` must be sealed and sorted by ascending id. A decode failure
    /// in any input fails the merge with `CorruptSegment`.
    pub fn merge(&self, inputs: &[Arc<Segment>], staging: &Segment) -> CoreResult<MergeOutput> {
        let mut result = CompactionResult {
            input_segments: inputs.iter().map(|s| s.id()).collect(),
            ..CompactionResult::default()
        };

        let mut latest: HashMap<Vec<u8>, (usize, u64)> = HashMap::new();
        for (position, segment) in inputs.iter().enumerate() {
            if !segment.is_sealed() {
                return Err(CoreError::invalid_operation(format!(
                    "cannot compact active segment {}",
                    segment.id()
                )));
            }
            result.bytes_before += segment.size()?;

            for scanned in segment.iter() {
                let scanned = scanned.map_err(|e| e.in_segment(segment.id()))?;
                result.input_records += 1;

                if scanned.record.is_tombstone() {
                    result.tombstones_removed += 1;
                    if latest.remove(&scanned.record.key).is_some() {
                        result.obsolete_versions_removed += 1;
                    }
                } else if latest
                    .insert(scanned.record.key, (position, scanned.offset))
                    .is_some()
                {
                    result.obsolete_versions_removed += 1;
                }
            }
        }

        let mut survivors: Vec<_> = latest.into_iter().collect();
        survivors.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let mut relocations = HashMap::with_capacity(survivors.len());
        for (key, (position, offset)) in survivors {
            let segment = &inputs[position];
            let (record, _) = segment
                .read_at(offset)
                .map_err(|e| e.in_segment(segment.id()))?;
            if record.key != key {
                return Err(CoreError::corrupt_segment(
                    segment.id(),
                    format!("record at offset {offset} changed during compaction"),
                ));
            }
            let new_offset = staging.append(&record.encode()?)?;
            relocations.insert((segment.id(), offset), new_offset);
        }

        staging.sync()?;
        result.output_records = relocations.len();
        result.bytes_after = staging.size()?;

        Ok(MergeOutput {
            relocations,
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::record::SegmentRecord;
    use bitlog_storage::InMemoryBackend;

    fn sealed(id: u64, records: &[SegmentRecord]) -> Arc<Segment> {
        let mut bytes = Vec::new();
        for record in records {
            bytes.extend(record.encode().unwrap());
        }
        Arc::new(Segment::from_backend(
            SegmentId::new(id),
            Box::new(InMemoryBackend::with_data(bytes)),
            true,
        ))
    }

    fn staging() -> Segment {
        Segment::from_backend(SegmentId::new(99), Box::new(InMemoryBackend::new()), false)
    }

    fn put(key: &[u8], value: &[u8]) -> SegmentRecord {
        SegmentRecord::put(key.to_vec(), value.to_vec())
    }

    fn output_records(staging: &Segment) -> Vec<SegmentRecord> {
        staging.iter().map(|r| r.unwrap().record).collect()
    }

    #[test]
    fn compact_removes_older_versions() {
        let inputs = vec![
            sealed(0, &[put(b"k", b"v1"), put(b"k", b"v2")]),
            sealed(2, &[put(b"k", b"v3")]),
        ];
        let staging = staging();

        let merged = Compactor::new().merge(&inputs, &staging).unwrap();

        assert_eq!(output_records(&staging), vec![put(b"k", b"v3")]);
        assert_eq!(merged.result.input_records, 3);
        assert_eq!(merged.result.output_records, 1);
        assert_eq!(merged.result.obsolete_versions_removed, 2);
        assert_eq!(merged.relocations.get(&(SegmentId::new(2), 0)), Some(&0));
    }

    #[test]
    fn compact_removes_tombstones() {
        let inputs = vec![
            sealed(0, &[put(b"gone", b"data"), put(b"live", b"x")]),
            sealed(2, &[SegmentRecord::tombstone(b"gone".to_vec())]),
        ];
        let staging = staging();

        let merged = Compactor::new().merge(&inputs, &staging).unwrap();

        assert_eq!(output_records(&staging), vec![put(b"live", b"x")]);
        assert_eq!(merged.result.tombstones_removed, 1);
        assert_eq!(merged.result.obsolete_versions_removed, 1);
        assert!(merged.result.bytes_after < merged.result.bytes_before);
    }

    #[test]
    fn put_after_tombstone_survives() {
        let inputs = vec![sealed(
            0,
            &[
                put(b"k", b"1"),
                SegmentRecord::tombstone(b"k".to_vec()),
                put(b"k", b"2"),
            ],
        )];
        let staging = staging();
        Compactor::new().merge(&inputs, &staging).unwrap();
        assert_eq!(output_records(&staging), vec![put(b"k", b"2")]);
    }

    #[test]
    fn compact_deterministic_order() {
        let inputs = vec![sealed(
            0,
            &[put(b"c", b"3"), put(b"a", b"1"), put(b"b", b"2")],
        )];
        let staging = staging();
        Compactor::new().merge(&inputs, &staging).unwrap();

        let keys: Vec<_> = output_records(&staging).into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn compact_empty_input() {
        let staging = staging();
        let merged = Compactor::new().merge(&[], &staging).unwrap();
        assert_eq!(merged.result.input_records, 0);
        assert_eq!(merged.result.output_records, 0);
        assert_eq!(staging.size().unwrap(), 0);
    }

    #[test]
    fn corrupt_input_fails() {
        let mut bytes = put(b"k", b"value").encode().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x55;
        let inputs = vec![Arc::new(Segment::from_backend(
            SegmentId::new(4),
            Box::new(InMemoryBackend::with_data(bytes)),
            true,
        ))];

        let result = Compactor::new().merge(&inputs, &staging());
        match result {
            Err(CoreError::CorruptSegment { segment_id, .. }) => {
                assert_eq!(segment_id, SegmentId::new(4));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn active_input_rejected() {
        let active = Arc::new(Segment::from_backend(
            SegmentId::new(0),
            Box::new(InMemoryBackend::new()),
            false,
        ));
        let result = Compactor::new().merge(&[active], &staging());
        assert!(matches!(result, Err(CoreError::InvalidOperation { .. })));
    }
}
