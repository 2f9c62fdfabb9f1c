//! Store directory management.
//!
//! This module handles the file system layout of a store:
//!
//! ```text
//! <path>/
//! ├─ LOCK              # Advisory lock for single-engine access
//! ├─ <id>.seg          # Sealed segments, zero or more
//! ├─ <id>.active       # The active segment, exactly one after open
//! └─ compact.tmp       # Compaction staging file, transient
//! ```
//!
//! Segment ids are decimal without padding. They are always parsed and
//! compared as numbers, so `10.seg` sorts after `9.seg`.

use crate::error::{CoreError, CoreResult};
use crate::types::SegmentId;
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::warn;

const LOCK_FILE: &str = "LOCK";

/// Suffix of the active segment file.
pub const ACTIVE_SUFFIX: &str = ".active";

/// Suffix of sealed segment files.
pub const SEALED_SUFFIX: &str = ".seg";

/// Name of the compaction staging file.
pub const STAGING_FILE: &str = "compact.tmp";

/// A segment file name recognised inside a store directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentFile {
    /// `<id>.seg`
    Sealed(SegmentId),
    /// `<id>.active`
    Active(SegmentId),
}

impl SegmentFile {
    /// Parses a directory entry name. Returns `None` for anything that is
    /// not a segment file, including ids with signs, spaces or non-ASCII
    /// digits.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        if let Some(stem) = name.strip_suffix(SEALED_SUFFIX) {
            parse_id(stem).map(Self::Sealed)
        } else if let Some(stem) = name.strip_suffix(ACTIVE_SUFFIX) {
            parse_id(stem).map(Self::Active)
        } else {
            None
        }
    }

    /// Returns the file name for this segment.
    #[must_use]
    pub fn file_name(self) -> String {
        match self {
            Self::Sealed(id) => format!("{}{SEALED_SUFFIX}", id.as_u64()),
            Self::Active(id) => format!("{}{ACTIVE_SUFFIX}", id.as_u64()),
        }
    }
}

fn parse_id(stem: &str) -> Option<SegmentId> {
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok().map(SegmentId::new)
}

/// Segment files found by [`EngineDir::scan`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DirListing {
    /// Sealed segment ids in ascending numeric order.
    pub sealed: Vec<SegmentId>,
    /// Active segment ids in ascending numeric order.
    pub active: Vec<SegmentId>,
    /// Whether a compaction staging file is present.
    pub staging: bool,
}

/// Scans a directory without taking the lock.
pub(crate) fn scan_path(path: &Path) -> CoreResult<DirListing> {
    let mut listing = DirListing::default();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name == STAGING_FILE {
            listing.staging = true;
            continue;
        }
        match SegmentFile::parse(name) {
            Some(SegmentFile::Sealed(id)) => listing.sealed.push(id),
            Some(SegmentFile::Active(id)) => listing.active.push(id),
            None => {}
        }
    }
    listing.sealed.sort_unstable();
    listing.active.sort_unstable();
    Ok(listing)
}

/// Owns a store directory and the exclusive lock on it.
///
/// Only one `EngineDir` can exist per directory at a time, across
/// processes. The lock is released by [`EngineDir::unlock`] or when the
/// value is dropped.
#[derive(Debug)]
pub struct EngineDir {
    path: PathBuf,
    lock: Mutex<Option<File>>,
}

impl EngineDir {
    /// Opens or creates a store directory and locks it.
    ///
    /// # Errors
    ///
    /// - `InvalidFormat` if the directory is missing and `create_if_missing`
    ///   is false, or if the path is not a directory
    /// - `DatabaseLocked` if another engine holds the lock
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_format(format!(
                    "store directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DatabaseLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            lock: Mutex::new(Some(lock_file)),
        })
    }

    /// Releases the directory lock so another engine can open the store.
    ///
    /// Releasing twice is a no-op.
    pub fn unlock(&self) {
        let Some(lock_file) = self.lock.lock().take() else {
            return;
        };
        if let Err(e) = FileExt::unlock(&lock_file) {
            warn!(path = %self.path.display(), error = %e, "failed to release store lock");
        }
    }

    /// Returns whether this handle still holds the directory lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.lock.lock().is_some()
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the active file for `id`.
    #[must_use]
    pub fn active_path(&self, id: SegmentId) -> PathBuf {
        self.path.join(SegmentFile::Active(id).file_name())
    }

    /// Path of the sealed file for `id`.
    #[must_use]
    pub fn sealed_path(&self, id: SegmentId) -> PathBuf {
        self.path.join(SegmentFile::Sealed(id).file_name())
    }

    /// Path of the compaction staging file.
    #[must_use]
    pub fn staging_path(&self) -> PathBuf {
        self.path.join(STAGING_FILE)
    }

    /// Lists the segment files currently in the directory.
    pub fn scan(&self) -> CoreResult<DirListing> {
        scan_path(&self.path)
    }

    /// Deletes the staging file if present. Returns whether one existed.
    pub fn remove_staging(&self) -> CoreResult<bool> {
        match fs::remove_file(self.staging_path()) {
            Ok(()) => {
                self.sync()?;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Syncs the directory so that creates, renames and deletes are durable.
    #[cfg(unix)]
    pub fn sync(&self) -> CoreResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    /// NTFS journals metadata; directory handles cannot be fsynced.
    #[cfg(not(unix))]
    pub fn sync(&self) -> CoreResult<()> {
        Ok(())
    }
}
