//! In-memory key index.
//!
//! Maps every live key to the position of its latest record. The index is
//! rebuilt from the segments at open and never persisted.

use crate::segment::SegmentRecord;
use crate::types::SegmentId;
use std::collections::{BTreeSet, HashMap};

/// Position of the latest record for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Segment holding the record.
    pub segment_id: SegmentId,
    /// Offset of the record within the segment.
    pub offset: u64,
    /// Framed length of the record.
    pub len: u64,
}

impl IndexEntry {
    /// Creates an index entry.
    #[must_use]
    pub const fn new(segment_id: SegmentId, offset: u64, len: u64) -> Self {
        Self {
            segment_id,
            offset,
            len,
        }
    }
}

/// Key to record-position map.
///
/// Entries reference segments by id only. The engine owns the table that
/// turns an id into an open segment.
#[derive(Debug, Default)]
pub struct Index {
    entries: HashMap<Vec<u8>, IndexEntry>,
}

impl Index {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for `key`.
    #[must_use]
    pub fn lookup(&self, key: &[u8]) -> Option<IndexEntry> {
        self.entries.get(key).copied()
    }

    /// Points `key` at a new record, returning the previous entry.
    pub fn insert(&mut self, key: Vec<u8>, entry: IndexEntry) -> Option<IndexEntry> {
        self.entries.insert(key, entry)
    }

    /// Drops `key`, returning its entry if it was present.
    pub fn remove(&mut self, key: &[u8]) -> Option<IndexEntry> {
        self.entries.remove(key)
    }

    /// Applies one replayed record: a tombstone removes the key, anything
    /// else inserts it.
    pub fn apply(&mut self, record: &SegmentRecord, entry: IndexEntry) {
        if record.is_tombstone() {
            self.entries.remove(record.key.as_slice());
        } else {
            self.entries.insert(record.key.clone(), entry);
        }
    }

    /// Repoints every entry inside `ids` to `output`.
    ///
    /// `relocations` maps `(old_segment, old_offset)` to the record's offset
    /// in `output`. Entries outside `ids` are untouched. An entry inside
    /// `ids` without a relocation is dropped.
    ///
    /// Returns the number of entries repointed.
    pub fn rebuild_range(
        &mut self,
        ids: &BTreeSet<SegmentId>,
        relocations: &HashMap<(SegmentId, u64), u64>,
        output: SegmentId,
    ) -> usize {
        let mut moved = 0;
        self.entries.retain(|_, entry| {
            if !ids.contains(&entry.segment_id) {
                return true;
            }
            match relocations.get(&(entry.segment_id, entry.offset)) {
                Some(&offset) => {
                    entry.segment_id = output;
                    entry.offset = offset;
                    moved += 1;
                    true
                }
                None => false,
            }
        });
        moved
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no key is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over all live keys in arbitrary order.
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.entries.keys().map(Vec::as_slice)
    }
}
