//! Error types for bitlog core.

use crate::types::SegmentId;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in engine operations.
///
/// A missing key is not an error: [`crate::Engine::get`] returns `Ok(None)`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] bitlog_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Fewer bytes are available than the record header declares.
    ///
    /// Tolerated at the tail of the active segment, fatal anywhere else.
    #[error("truncated record at offset {offset}: needed {needed} bytes, {available} available")]
    TruncatedRecord {
        /// Offset where the record starts.
        offset: u64,
        /// Bytes the record requires.
        needed: u64,
        /// Bytes actually present.
        available: u64,
    },

    /// A complete record failed its checksum.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Checksum stored in the record.
        expected: u32,
        /// Checksum computed over the record bytes.
        actual: u32,
    },

    /// A record header is structurally invalid.
    #[error("malformed record at offset {offset}: {message}")]
    MalformedRecord {
        /// Offset where the record starts.
        offset: u64,
        /// Description of the problem.
        message: String,
    },

    /// A sealed segment could not be fully decoded.
    #[error("corrupt segment {segment_id}: {message}")]
    CorruptSegment {
        /// The damaged segment.
        segment_id: SegmentId,
        /// Description of the corruption.
        message: String,
    },

    /// Key or value exceeds the on-disk length field.
    #[error("{what} of {len} bytes exceeds the record limit")]
    RecordTooLarge {
        /// `"key"` or `"value"`.
        what: &'static str,
        /// Offending length.
        len: usize,
    },

    /// Another engine holds the directory lock.
    #[error("store locked: another engine has exclusive access")]
    DatabaseLocked,

    /// The directory contents do not form a valid store.
    #[error("invalid store format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// The engine has been closed.
    #[error("engine is closed")]
    EngineClosed,
}

impl CoreError {
    /// Creates a corrupt segment error.
    pub fn corrupt_segment(segment_id: SegmentId, message: impl Into<String>) -> Self {
        Self::CorruptSegment {
            segment_id,
            message: message.into(),
        }
    }

    /// Creates a malformed record error.
    pub fn malformed_record(offset: u64, message: impl Into<String>) -> Self {
        Self::MalformedRecord {
            offset,
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if this error describes damaged record bytes rather
    /// than a failed system call.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::TruncatedRecord { .. }
                | Self::ChecksumMismatch { .. }
                | Self::MalformedRecord { .. }
                | Self::CorruptSegment { .. }
        )
    }

    /// Wraps a record-level decode failure as corruption of `segment_id`.
    ///
    /// Errors that are not about record bytes pass through unchanged.
    #[must_use]
    pub fn in_segment(self, segment_id: SegmentId) -> Self {
        match self {
            Self::TruncatedRecord { .. }
            | Self::ChecksumMismatch { .. }
            | Self::MalformedRecord { .. } => Self::corrupt_segment(segment_id, self.to_string()),
            other => other,
        }
    }
}
