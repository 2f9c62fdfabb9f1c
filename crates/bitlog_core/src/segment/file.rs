//! Segment files.

use crate::error::{CoreError, CoreResult};
use crate::segment::record::SegmentRecord;
use crate::types::SegmentId;
use bitlog_storage::{FileBackend, StorageBackend};
use parking_lot::RwLock;
use std::fs;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

const SCAN_BUFFER: usize = 64 * 1024;

struct SegmentState {
    backend: Box<dyn StorageBackend>,
    path: Option<PathBuf>,
    sealed: bool,
}

/// One append-only run of records with a stable id.
///
/// The backend sits behind a `RwLock`: appends take the write lock for the
/// duration of one append, reads take the read lock, so any number of
/// readers proceed concurrently with each other.
///
/// A segment is either active (accepting appends) or sealed (read-only).
/// Sealing never changes the id.
pub struct Segment {
    id: SegmentId,
    state: RwLock<SegmentState>,
}

impl Segment {
    /// Opens or creates the active segment file at `path`, keeping any
    /// bytes already in it.
    pub fn open_active(id: SegmentId, path: &Path) -> CoreResult<Self> {
        let backend = FileBackend::open(path)?;
        Ok(Self::with_path(id, Box::new(backend), path, false))
    }

    /// Opens an existing sealed segment file.
    pub fn open_sealed(id: SegmentId, path: &Path) -> CoreResult<Self> {
        if !path.is_file() {
            return Err(CoreError::corrupt_segment(
                id,
                format!("segment file missing: {}", path.display()),
            ));
        }
        let backend = FileBackend::open(path)?;
        Ok(Self::with_path(id, Box::new(backend), path, true))
    }

    /// Creates an empty, writable file that will be sealed under `id`,
    /// discarding any previous contents at `path`.
    pub fn create_staging(id: SegmentId, path: &Path) -> CoreResult<Self> {
        let backend = FileBackend::create(path)?;
        Ok(Self::with_path(id, Box::new(backend), path, false))
    }

    /// Wraps an arbitrary backend. Such a segment has no file: sealing
    /// only flips it to read-only and removing it is a no-op.
    #[must_use]
    pub fn from_backend(id: SegmentId, backend: Box<dyn StorageBackend>, sealed: bool) -> Self {
        Self {
            id,
            state: RwLock::new(SegmentState {
                backend,
                path: None,
                sealed,
            }),
        }
    }

    fn with_path(id: SegmentId, backend: Box<dyn StorageBackend>, path: &Path, sealed: bool) -> Self {
        Self {
            id,
            state: RwLock::new(SegmentState {
                backend,
                path: Some(path.to_path_buf()),
                sealed,
            }),
        }
    }

    /// Returns the segment id.
    #[must_use]
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Returns the current file path, if the segment is file-backed.
    #[must_use]
    pub fn path(&self) -> Option<PathBuf> {
        self.state.read().path.clone()
    }

    /// Returns whether the segment is read-only.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.state.read().sealed
    }

    /// Returns the size in bytes, which is also the next append offset.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.state.read().backend.size()?)
    }

    /// Appends encoded record bytes and returns their offset.
    pub fn append(&self, bytes: &[u8]) -> CoreResult<u64> {
        let mut state = self.state.write();
        if state.sealed {
            return Err(CoreError::invalid_operation(format!(
                "segment {} is sealed",
                self.id
            )));
        }
        Ok(state.backend.append(bytes)?)
    }

    /// Flushes and fsyncs appended data.
    pub fn sync(&self) -> CoreResult<()> {
        let mut state = self.state.write();
        state.backend.flush()?;
        state.backend.sync()?;
        Ok(())
    }

    /// Cuts the segment back to `len` bytes.
    pub fn truncate(&self, len: u64) -> CoreResult<()> {
        let mut state = self.state.write();
        if state.sealed {
            return Err(CoreError::invalid_operation(format!(
                "segment {} is sealed",
                self.id
            )));
        }
        state.backend.truncate(len)?;
        Ok(())
    }

    /// Reads the record starting at `offset`.
    ///
    /// Returns the record and its framed length.
    pub fn read_at(&self, offset: u64) -> CoreResult<(SegmentRecord, usize)> {
        let state = self.state.read();
        let size = state.backend.size()?;
        let available = size.saturating_sub(offset);

        let header_len = SegmentRecord::HEADER_SIZE as u64;
        if available < header_len {
            return Err(CoreError::TruncatedRecord {
                offset,
                needed: header_len,
                available,
            });
        }

        let header_bytes = state.backend.read_at(offset, SegmentRecord::HEADER_SIZE)?;
        let mut header = [0u8; SegmentRecord::HEADER_SIZE];
        header.copy_from_slice(&header_bytes);

        let frame_len = SegmentRecord::frame_len(&header);
        if available < frame_len {
            return Err(CoreError::TruncatedRecord {
                offset,
                needed: frame_len,
                available,
            });
        }

        let frame_len = usize::try_from(frame_len)
            .map_err(|_| CoreError::malformed_record(offset, "record length overflows usize"))?;
        let data = state.backend.read_at(offset, frame_len)?;
        drop(state);

        let mut reader = data.as_slice();
        SegmentRecord::decode_from(&mut reader, offset)?.ok_or(CoreError::TruncatedRecord {
            offset,
            needed: header_len,
            available: 0,
        })
    }

    /// Returns whether every byte from `offset` to the end is zero.
    ///
    /// Preallocated or zero-filled space after the last record reads this
    /// way. An offset at or past the end is trivially zero.
    pub fn is_zero_from(&self, offset: u64) -> CoreResult<bool> {
        let state = self.state.read();
        let size = state.backend.size()?;
        let mut pos = offset;
        while pos < size {
            let len = usize::try_from(size - pos).map_or(SCAN_BUFFER, |left| left.min(SCAN_BUFFER));
            let chunk = state.backend.read_at(pos, len)?;
            if chunk.iter().any(|&b| b != 0) {
                return Ok(false);
            }
            pos += len as u64;
        }
        Ok(true)
    }

    /// Flushes, syncs, renames the file to `target` and makes the segment
    /// read-only.
    ///
    /// Sealing an already sealed segment is a no-op.
    pub fn seal(&self, target: &Path) -> CoreResult<()> {
        let mut state = self.state.write();
        if state.sealed {
            return Ok(());
        }

        state.backend.flush()?;
        state.backend.sync()?;

        if let Some(path) = state.path.as_deref() {
            if path != target {
                fs::rename(path, target)?;
                state.path = Some(target.to_path_buf());
            }
        }

        state.sealed = true;
        Ok(())
    }

    /// Deletes the segment file.
    ///
    /// Handles that are still open keep working until dropped.
    pub fn remove(&self) -> CoreResult<()> {
        let state = self.state.read();
        if !state.sealed {
            return Err(CoreError::invalid_operation(format!(
                "segment {} is active and cannot be removed",
                self.id
            )));
        }
        if let Some(path) = &state.path {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Returns a sequential iterator over every record, starting at offset 0.
    ///
    /// The iterator stops after the first error.
    #[must_use]
    pub fn iter(&self) -> SegmentIter<'_> {
        SegmentIter {
            reader: BufReader::with_capacity(
                SCAN_BUFFER,
                ChunkReader {
                    segment: self,
                    pos: 0,
                },
            ),
            offset: 0,
            done: false,
        }
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Segment")
            .field("id", &self.id)
            .field("path", &state.path)
            .field("sealed", &state.sealed)
            .finish_non_exhaustive()
    }
}

/// A record found while scanning a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedRecord {
    /// Offset of the record within the segment.
    pub offset: u64,
    /// Framed length in bytes.
    pub len: usize,
    /// The decoded record.
    pub record: SegmentRecord,
}

/// Streams records out of a segment.
pub struct SegmentIter<'a> {
    reader: BufReader<ChunkReader<'a>>,
    offset: u64,
    done: bool,
}

impl SegmentIter<'_> {
    /// Offset just past the last record returned.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl Iterator for SegmentIter<'_> {
    type Item = CoreResult<ScannedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match SegmentRecord::decode_from(&mut self.reader, self.offset) {
            Ok(Some((record, len))) => {
                let offset = self.offset;
                self.offset += len as u64;
                Some(Ok(ScannedRecord {
                    offset,
                    len,
                    record,
                }))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Adapts a segment backend to `io::Read`, taking the read lock per call.
struct ChunkReader<'a> {
    segment: &'a Segment,
    pos: u64,
}

impl Read for ChunkReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let state = self.segment.state.read();
        let size = state
            .backend
            .size()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let remaining = size.saturating_sub(self.pos);
        let n = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
        if n == 0 {
            return Ok(0);
        }
        let data = state
            .backend
            .read_at(self.pos, n)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        buf[..n].copy_from_slice(&data);
        self.pos += n as u64;
        Ok(n)
    }
}
