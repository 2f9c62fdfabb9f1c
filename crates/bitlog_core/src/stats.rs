//! Engine statistics.
//!
//! Counters are atomic and can be read while operations are in progress.
//!
//! ```rust,ignore
//! let stats = engine.stats();
//! println!("writes: {}, rotations: {}", stats.writes, stats.rotations);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters owned by one engine instance.
#[derive(Debug, Default)]
pub struct EngineStats {
    reads: AtomicU64,
    read_misses: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    bytes_written: AtomicU64,
    bytes_read: AtomicU64,
    rotations: AtomicU64,
    compactions: AtomicU64,
    errors: AtomicU64,
}

impl EngineStats {
    /// Creates a zeroed stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read(&self, bytes: u64) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.read_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self, bytes: u64) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self, bytes: u64) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_rotation(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_compaction(&self) {
        self.compactions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            read_misses: self.read_misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            compactions: self.compactions.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// A copy of the engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Get calls, hits and misses.
    pub reads: u64,
    /// Get calls that found no key.
    pub read_misses: u64,
    /// Acknowledged puts.
    pub writes: u64,
    /// Acknowledged deletes.
    pub deletes: u64,
    /// Encoded bytes appended by puts and deletes.
    pub bytes_written: u64,
    /// Value bytes returned by gets.
    pub bytes_read: u64,
    /// Active segments sealed by rotation.
    pub rotations: u64,
    /// Completed compactions that installed an output segment.
    pub compactions: u64,
    /// Write commands that failed.
    pub errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn counters_accumulate() {
        let stats = EngineStats::new();
        stats.record_write(10);
        stats.record_delete(5);
        stats.record_read(3);
        stats.record_miss();

        let snap = stats.snapshot();
        assert_eq!(snap.writes, 1);
        assert_eq!(snap.deletes, 1);
        assert_eq!(snap.bytes_written, 15);
        assert_eq!(snap.reads, 2);
        assert_eq!(snap.read_misses, 1);
        assert_eq!(snap.bytes_read, 3);
    }

    #[test]
    fn concurrent_updates() {
        let stats = Arc::new(EngineStats::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..250 {
                        stats.record_write(1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.snapshot().writes, 1000);
    }
}
