//! Segment storage.
//!
//! A store is a sequence of segments. The active segment accepts appends;
//! once it outgrows the configured size it is sealed and never modified
//! again, until compaction replaces it.
//!
//! ## Segment Record Format
//!
//! ```text
//! | crc32c (4) | flags (1) | key_len (4) | value_len (4) | key (K) | value (V) |
//! ```
//!
//! Flags:
//! - `0x01` = tombstone (deleted key, `value_len` is 0)

mod compaction;
mod file;
mod record;
mod set;

pub use compaction::{CompactionResult, Compactor, MergeOutput};
pub use file::{ScannedRecord, Segment, SegmentIter};
pub use record::{RecordFlags, SegmentRecord};
pub use set::SegmentSet;
