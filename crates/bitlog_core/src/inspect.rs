//! Offline inspection of a store directory.
//!
//! Reads every segment file without taking the directory lock and without
//! modifying anything. Used by the `inspect` and `verify` CLI commands.

use crate::dir::{scan_path, SegmentFile};
use crate::error::{CoreError, CoreResult};
use crate::segment::Segment;
use crate::types::SegmentId;
use bitlog_storage::FileBackend;
use serde::Serialize;
use std::path::Path;

/// Health of one segment file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SegmentStatus {
    /// Every byte decodes.
    Ok,
    /// The active segment ends inside a record or in zero fill. Recovery
    /// will cut it off.
    TornTail {
        /// Bytes after the last complete record.
        discarded: u64,
    },
    /// The segment cannot be fully decoded. Opening the store will fail.
    Corrupt {
        /// Description of the first failure.
        message: String,
    },
}

/// Per-segment summary produced by [`inspect_directory`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentReport {
    /// Segment id.
    pub id: SegmentId,
    /// File name inside the directory.
    pub file_name: String,
    /// Whether the file is a sealed segment.
    pub sealed: bool,
    /// File size in bytes.
    pub size: u64,
    /// Records decoded before the end or the first failure.
    pub records: u64,
    /// Tombstones among them.
    pub tombstones: u64,
    /// Bytes covered by complete records.
    pub valid_bytes: u64,
    /// Decode outcome.
    #[serde(flatten)]
    pub status: SegmentStatus,
}

impl SegmentReport {
    /// Returns true if opening the store would fail on this segment.
    #[must_use]
    pub fn is_corrupt(&self) -> bool {
        matches!(self.status, SegmentStatus::Corrupt { .. })
    }
}

/// Decodes every segment in `path`, in replay order.
///
/// # Errors
///
/// Fails only if the directory cannot be listed or a file cannot be
/// opened; decode failures are reported per segment.
pub fn inspect_directory(path: &Path) -> CoreResult<Vec<SegmentReport>> {
    if !path.is_dir() {
        return Err(CoreError::invalid_format(format!(
            "not a store directory: {}",
            path.display()
        )));
    }

    let listing = scan_path(path)?;
    let files = listing
        .sealed
        .iter()
        .map(|id| SegmentFile::Sealed(*id))
        .chain(listing.active.iter().map(|id| SegmentFile::Active(*id)));

    let mut reports = Vec::new();
    for file in files {
        let (id, sealed) = match file {
            SegmentFile::Sealed(id) => (id, true),
            SegmentFile::Active(id) => (id, false),
        };
        let file_name = file.file_name();
        let backend = FileBackend::open_read_only(&path.join(&file_name))?;
        let segment = Segment::from_backend(id, Box::new(backend), true);
        reports.push(inspect_segment(&segment, file_name, sealed)?);
    }
    Ok(reports)
}

fn inspect_segment(segment: &Segment, file_name: String, sealed: bool) -> CoreResult<SegmentReport> {
    let size = segment.size()?;
    let mut report = SegmentReport {
        id: segment.id(),
        file_name,
        sealed,
        size,
        records: 0,
        tombstones: 0,
        valid_bytes: 0,
        status: SegmentStatus::Ok,
    };

    let mut iter = segment.iter();
    let mut end = 0;
    for next in iter.by_ref() {
        match next {
            Ok(scanned) => {
                end = scanned.offset + scanned.len as u64;
                report.records += 1;
                if scanned.record.is_tombstone() {
                    report.tombstones += 1;
                }
            }
            Err(CoreError::TruncatedRecord { .. }) if !sealed => {
                report.status = SegmentStatus::TornTail { discarded: 0 };
                break;
            }
            Err(CoreError::MalformedRecord { .. } | CoreError::ChecksumMismatch { .. })
                if !sealed && segment.is_zero_from(end)? =>
            {
                report.status = SegmentStatus::TornTail { discarded: 0 };
                break;
            }
            Err(e) => {
                report.status = SegmentStatus::Corrupt {
                    message: e.to_string(),
                };
                break;
            }
        }
    }
    report.valid_bytes = iter.offset();
    if let SegmentStatus::TornTail { discarded } = &mut report.status {
        *discarded = size - report.valid_bytes;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SegmentRecord;
    use std::fs;
    use tempfile::tempdir;

    fn encoded(records: &[SegmentRecord]) -> Vec<u8> {
        records.iter().flat_map(|r| r.encode().unwrap()).collect()
    }

    #[test]
    fn reports_every_segment() {
        let temp = tempdir().unwrap();
        fs::write(
            temp.path().join("0.seg"),
            encoded(&[
                SegmentRecord::put(b"a".to_vec(), b"1".to_vec()),
                SegmentRecord::tombstone(b"a".to_vec()),
            ]),
        )
        .unwrap();
        let mut active = encoded(&[SegmentRecord::put(b"b".to_vec(), b"2".to_vec())]);
        active.extend_from_slice(&[0xAB; 5]);
        fs::write(temp.path().join("2.active"), &active).unwrap();

        let reports = inspect_directory(temp.path()).unwrap();
        assert_eq!(reports.len(), 2);

        assert_eq!(reports[0].records, 2);
        assert_eq!(reports[0].tombstones, 1);
        assert_eq!(reports[0].status, SegmentStatus::Ok);

        assert!(!reports[1].sealed);
        assert_eq!(reports[1].records, 1);
        assert_eq!(reports[1].status, SegmentStatus::TornTail { discarded: 5 });
        assert!(!reports.iter().any(SegmentReport::is_corrupt));
    }

    #[test]
    fn zero_filled_active_tail_is_torn() {
        let temp = tempdir().unwrap();
        let mut active = encoded(&[SegmentRecord::put(b"b".to_vec(), b"2".to_vec())]);
        let valid = active.len() as u64;
        active.extend_from_slice(&[0u8; 4096]);
        fs::write(temp.path().join("0.active"), &active).unwrap();
        fs::write(temp.path().join("2.seg"), &active).unwrap();

        let reports = inspect_directory(temp.path()).unwrap();
        assert!(reports[0].sealed);
        assert!(reports[0].is_corrupt());
        assert_eq!(reports[1].valid_bytes, valid);
        assert_eq!(reports[1].status, SegmentStatus::TornTail { discarded: 4096 });
    }

    #[test]
    fn corrupt_sealed_segment_is_flagged() {
        let temp = tempdir().unwrap();
        let mut bytes = encoded(&[SegmentRecord::put(b"a".to_vec(), b"value".to_vec())]);
        bytes[15] ^= 0x01;
        fs::write(temp.path().join("4.seg"), bytes).unwrap();

        let reports = inspect_directory(temp.path()).unwrap();
        assert!(reports[0].is_corrupt());
        assert_eq!(reports[0].valid_bytes, 0);
    }

    #[test]
    fn json_shape() {
        let report = SegmentReport {
            id: SegmentId::new(3),
            file_name: "3.seg".to_string(),
            sealed: true,
            size: 10,
            records: 1,
            tombstones: 0,
            valid_bytes: 10,
            status: SegmentStatus::Ok,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["status"], "ok");
    }
}
