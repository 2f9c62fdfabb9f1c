//! Core type definitions.

use serde::Serialize;
use std::fmt;

/// Stable identifier of a segment.
///
/// Ids order segments by age: replaying segments in ascending id order
/// replays writes in the order they were applied. An id is assigned once
/// and keeps naming the same data after the file is renamed on seal.
///
/// Active segments always carry even ids and rotation advances by two, so
/// `id + 1` stays free after every segment sealed by rotation. Compaction
/// publishes its output under that free odd id, which sorts after every
/// merged segment and before every later one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SegmentId(pub u64);

impl SegmentId {
    /// Id of the first active segment in an empty store.
    pub const FIRST: Self = Self(0);

    /// Creates a segment id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Id of the active segment opened when this one is sealed.
    #[must_use]
    pub const fn next_active(self) -> Self {
        Self(self.0 + 2)
    }

    /// Id a compaction publishes when this is the newest merged segment.
    #[must_use]
    pub const fn compaction_output(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns true if a compaction published this segment.
    #[must_use]
    pub const fn is_compaction_output(self) -> bool {
        self.0 % 2 == 1
    }

    /// Smallest valid active id greater than `self`.
    #[must_use]
    pub const fn next_active_after(self) -> Self {
        if self.is_compaction_output() {
            Self(self.0 + 1)
        } else {
            Self(self.0 + 2)
        }
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seg:{}", self.0)
    }
}
