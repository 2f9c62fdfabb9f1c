//! Segment record codec.

use crate::error::{CoreError, CoreResult};
use std::io::{self, Read};

/// Flags for segment records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordFlags(u8);

impl RecordFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Record deletes its key.
    pub const TOMBSTONE: Self = Self(0x01);

    const KNOWN: u8 = 0x01;

    /// Creates flags from a raw byte, rejecting unknown bits.
    #[must_use]
    pub const fn from_byte(b: u8) -> Option<Self> {
        if b & !Self::KNOWN == 0 {
            Some(Self(b))
        } else {
            None
        }
    }

    /// Returns the raw byte value.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self.0
    }

    /// Checks if the tombstone flag is set.
    #[must_use]
    pub const fn is_tombstone(self) -> bool {
        self.0 & 0x01 != 0
    }
}

/// A key with either a value or a tombstone, as stored in a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRecord {
    /// The key. Never empty.
    pub key: Vec<u8>,
    /// Record flags.
    pub flags: RecordFlags,
    /// The value, empty for tombstones.
    pub value: Vec<u8>,
}

impl SegmentRecord {
    /// Header size: crc (4) + flags (1) + key_len (4) + value_len (4) = 13
    pub const HEADER_SIZE: usize = 13;

    /// Creates a put record.
    #[must_use]
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            flags: RecordFlags::NONE,
            value: value.into(),
        }
    }

    /// Creates a tombstone record.
    #[must_use]
    pub fn tombstone(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            flags: RecordFlags::TOMBSTONE,
            value: Vec::new(),
        }
    }

    /// Returns whether this is a tombstone.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.flags.is_tombstone()
    }

    /// Returns the encoded size of this record.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        Self::HEADER_SIZE + self.key.len() + self.value.len()
    }

    /// Checks that the record can be framed, before any I/O happens.
    pub fn validate(&self) -> CoreResult<()> {
        if self.key.is_empty() {
            return Err(CoreError::invalid_operation("key must not be empty"));
        }
        if u32::try_from(self.key.len()).is_err() {
            return Err(CoreError::RecordTooLarge {
                what: "key",
                len: self.key.len(),
            });
        }
        if u32::try_from(self.value.len()).is_err() {
            return Err(CoreError::RecordTooLarge {
                what: "value",
                len: self.value.len(),
            });
        }
        if self.is_tombstone() && !self.value.is_empty() {
            return Err(CoreError::invalid_operation("tombstone cannot carry a value"));
        }
        Ok(())
    }

    /// Total framed length declared by a record header.
    pub(crate) fn frame_len(header: &[u8; Self::HEADER_SIZE]) -> u64 {
        let key_len = u32::from_le_bytes([header[5], header[6], header[7], header[8]]);
        let value_len = u32::from_le_bytes([header[9], header[10], header[11], header[12]]);
        Self::HEADER_SIZE as u64 + u64::from(key_len) + u64::from(value_len)
    }

    /// Encodes the record to bytes.
    ///
    /// ```text
    /// | crc32c (4) | flags (1) | key_len (4) | value_len (4) | key | value |
    /// ```
    ///
    /// All integers are little-endian. The checksum covers every byte after
    /// it.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        self.validate()?;

        let mut buf = Vec::with_capacity(self.encoded_size());
        buf.extend_from_slice(&[0; 4]);
        buf.push(self.flags.as_byte());
        buf.extend_from_slice(&(self.key.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(self.value.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);

        let crc = crc32c::crc32c(&buf[4..]);
        buf[..4].copy_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Decodes one record from the start of `data`.
    ///
    /// Returns the record and the number of bytes it occupied.
    pub fn decode(data: &[u8]) -> CoreResult<(Self, usize)> {
        let mut reader = data;
        Self::decode_from(&mut reader, 0)?.ok_or(CoreError::TruncatedRecord {
            offset: 0,
            needed: Self::HEADER_SIZE as u64,
            available: 0,
        })
    }

    /// Decodes the next record from a reader positioned at `offset`.
    ///
    /// Returns `Ok(None)` at a clean end of log (no bytes at all), and
    /// `TruncatedRecord` when the reader ends inside a record. `offset` is
    /// only used for error reporting.
    pub fn decode_from<R: Read>(reader: &mut R, offset: u64) -> CoreResult<Option<(Self, usize)>> {
        let mut header = [0u8; Self::HEADER_SIZE];
        let got = read_full(reader, &mut header)?;
        if got == 0 {
            return Ok(None);
        }
        if got < Self::HEADER_SIZE {
            return Err(CoreError::TruncatedRecord {
                offset,
                needed: Self::HEADER_SIZE as u64,
                available: got as u64,
            });
        }

        let stored_crc = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let flags = RecordFlags::from_byte(header[4]).ok_or_else(|| {
            CoreError::malformed_record(offset, format!("unknown flags {:#04x}", header[4]))
        })?;
        let key_len = u32::from_le_bytes([header[5], header[6], header[7], header[8]]);
        let value_len = u32::from_le_bytes([header[9], header[10], header[11], header[12]]);

        if key_len == 0 {
            return Err(CoreError::malformed_record(offset, "empty key"));
        }
        if flags.is_tombstone() && value_len != 0 {
            return Err(CoreError::malformed_record(offset, "tombstone with a value"));
        }

        let body_len = u64::from(key_len) + u64::from(value_len);
        let mut body = Vec::new();
        reader.by_ref().take(body_len).read_to_end(&mut body)?;
        if (body.len() as u64) < body_len {
            return Err(CoreError::TruncatedRecord {
                offset,
                needed: Self::HEADER_SIZE as u64 + body_len,
                available: (Self::HEADER_SIZE + body.len()) as u64,
            });
        }

        let computed_crc = crc32c::crc32c_append(crc32c::crc32c(&header[4..]), &body);
        if stored_crc != computed_crc {
            return Err(CoreError::ChecksumMismatch {
                expected: stored_crc,
                actual: computed_crc,
            });
        }

        let value = body.split_off(key_len as usize);
        let consumed = Self::HEADER_SIZE + body.len() + value.len();
        Ok(Some((
            Self {
                key: body,
                flags,
                value,
            },
            consumed,
        )))
    }
}

/// Reads until `buf` is full or the reader is exhausted.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
