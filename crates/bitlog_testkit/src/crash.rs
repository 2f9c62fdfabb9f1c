//! Crash and corruption helpers.
//!
//! These operate on a closed store directory and damage segment files the
//! way an interrupted append or a failing disk would. Recovery is expected
//! to tolerate a torn active tail and to refuse anything else.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

pub use bitlog_core::{ACTIVE_SUFFIX, SEALED_SUFFIX, STAGING_FILE};

/// Returns segment files with `suffix`, sorted by numeric id.
pub fn segment_files(dir: &Path, suffix: &str) -> Vec<(u64, PathBuf)> {
    let mut files: Vec<_> = fs::read_dir(dir)
        .expect("Failed to list store directory")
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let id = name.strip_suffix(suffix)?.parse::<u64>().ok()?;
            Some((id, entry.path()))
        })
        .collect();
    files.sort_by_key(|(id, _)| *id);
    files
}

/// Path of the single active segment.
pub fn active_segment(dir: &Path) -> PathBuf {
    let mut files = segment_files(dir, ACTIVE_SUFFIX);
    assert_eq!(files.len(), 1, "expected exactly one active segment");
    files.remove(0).1
}

/// Paths of the sealed segments in id order.
pub fn sealed_segments(dir: &Path) -> Vec<PathBuf> {
    segment_files(dir, SEALED_SUFFIX)
        .into_iter()
        .map(|(_, path)| path)
        .collect()
}

/// Size of a file in bytes.
pub fn file_len(path: &Path) -> u64 {
    fs::metadata(path).expect("Failed to stat file").len()
}

/// Cuts `bytes` off the end of `path`, as a crash during an append would.
pub fn truncate_tail(path: &Path, bytes: u64) {
    let len = file_len(path);
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .expect("Failed to open file for truncation");
    file.set_len(len.saturating_sub(bytes))
        .expect("Failed to truncate file");
}

/// Appends `bytes` to `path`, simulating a record whose write was cut short.
pub fn append_garbage(path: &Path, bytes: &[u8]) {
    let mut data = fs::read(path).expect("Failed to read file");
    data.extend_from_slice(bytes);
    fs::write(path, data).expect("Failed to write file");
}

/// Flips every bit of the byte at `offset`.
pub fn flip_byte(path: &Path, offset: usize) {
    let mut data = fs::read(path).expect("Failed to read file");
    assert!(offset < data.len(), "offset {offset} past end of file");
    data[offset] ^= 0xFF;
    fs::write(path, data).expect("Failed to write file");
}

/// Leaves a half-written compaction output behind.
pub fn leave_staging_file(dir: &Path) -> PathBuf {
    let path = dir.join(STAGING_FILE);
    fs::write(&path, [0xAB; 64]).expect("Failed to write staging file");
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn segment_files_sort_numerically() {
        let temp = tempdir().unwrap();
        for id in [10, 2, 0] {
            fs::write(temp.path().join(format!("{id}.seg")), b"").unwrap();
        }
        fs::write(temp.path().join("notes.txt"), b"").unwrap();

        let ids: Vec<_> = segment_files(temp.path(), SEALED_SUFFIX)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![0, 2, 10]);
    }

    #[test]
    fn truncate_and_flip() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("0.active");
        fs::write(&path, [0u8; 10]).unwrap();

        truncate_tail(&path, 3);
        assert_eq!(file_len(&path), 7);

        flip_byte(&path, 2);
        assert_eq!(fs::read(&path).unwrap()[2], 0xFF);
    }
}
