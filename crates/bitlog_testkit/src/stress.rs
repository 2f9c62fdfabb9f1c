//! Stress helpers.
//!
//! Drive one engine from many threads and report what happened.

use crate::fixtures::{key, value};
use bitlog_core::Engine;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Writer threads.
    pub threads: usize,
    /// Puts per thread.
    pub writes_per_thread: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 8,
            writes_per_thread: 250,
        }
    }
}

impl StressConfig {
    /// Key index written by `thread` on its `n`th put. Distinct per call.
    pub fn key_index(&self, thread: usize, n: usize) -> usize {
        thread * self.writes_per_thread + n
    }

    /// Total number of distinct keys written.
    pub fn total_keys(&self) -> usize {
        self.threads * self.writes_per_thread
    }
}

/// Runs `config.threads` threads, each putting its own distinct keys.
pub fn concurrent_writers(engine: &Engine, config: &StressConfig) -> StressTestResult {
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let start = Instant::now();

    thread::scope(|scope| {
        for t in 0..config.threads {
            let successful = &successful;
            let failed = &failed;
            scope.spawn(move || {
                for n in 0..config.writes_per_thread {
                    let i = config.key_index(t, n);
                    match engine.put(&key(i), &value(i, 0)) {
                        Ok(()) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            });
        }
    });

    StressTestResult::new(
        successful.into_inner(),
        failed.into_inner(),
        start.elapsed(),
    )
}

/// Returns the keys written by [`concurrent_writers`] whose value does not
/// read back.
pub fn missing_after_concurrent_writers(engine: &Engine, config: &StressConfig) -> Vec<usize> {
    (0..config.total_keys())
        .filter(|&i| !matches!(engine.get(&key(i)), Ok(Some(v)) if v == value(i, 0)))
        .collect()
}

/// Puts and overwrites keys on several threads while another thread runs
/// compaction repeatedly. Returns the number of compactions that merged
/// something.
pub fn writes_during_compaction(engine: &Engine, config: &StressConfig, rounds: usize) -> usize {
    let merged = AtomicUsize::new(0);
    thread::scope(|scope| {
        for t in 0..config.threads {
            scope.spawn(move || {
                for n in 0..config.writes_per_thread {
                    let i = config.key_index(t, n);
                    engine.put(&key(i), &value(i, 0)).expect("put failed");
                }
            });
        }
        let merged = &merged;
        scope.spawn(move || {
            for _ in 0..rounds {
                let result = engine.compact().expect("compaction failed");
                if !result.is_noop() {
                    merged.fetch_add(1, Ordering::Relaxed);
                }
                thread::yield_now();
            }
        });
    });
    merged.into_inner()
}

/// Keys each writer overwrites in [`readers_during_writes_and_compaction`].
pub const HOT_KEYS_PER_WRITER: usize = 8;

/// What readers observed while writes and compaction ran.
#[derive(Debug, Clone, Default)]
pub struct ReadCheck {
    /// Gets performed by reader threads.
    pub reads: usize,
    /// Gets that returned a value, as opposed to a miss.
    pub hits: usize,
    /// Gets that failed, or returned bytes never written for the key.
    pub bad_reads: Vec<String>,
    /// Gets that returned a version older than one already acknowledged.
    pub stale_reads: Vec<String>,
    /// Compactions that merged something.
    pub compactions: usize,
}

impl ReadCheck {
    /// Returns true if every read was a written, up-to-date value.
    pub fn is_clean(&self) -> bool {
        self.bad_reads.is_empty() && self.stale_reads.is_empty()
    }
}

/// Version encoded in `bytes` if it is `value(i, version)` for some version.
fn written_version(i: usize, bytes: &[u8]) -> Option<usize> {
    let text = std::str::from_utf8(bytes).ok()?;
    text.strip_prefix(&format!("value-{i}-v"))?.parse().ok()
}

/// Reads key `i` once and records what came back against `floor`, the
/// last version acknowledged before the read started.
fn check_read(engine: &Engine, i: usize, floor: usize, max_version: usize, check: &mut ReadCheck) {
    check.reads += 1;
    match engine.get(&key(i)) {
        Ok(None) if floor == 0 => {}
        Ok(None) => check
            .stale_reads
            .push(format!("key {i}: miss after v{floor} was acknowledged")),
        Ok(Some(bytes)) => {
            check.hits += 1;
            match written_version(i, &bytes) {
                Some(v) if (1..=max_version).contains(&v) && v >= floor => {}
                Some(v) if (1..=max_version).contains(&v) => check
                    .stale_reads
                    .push(format!("key {i}: read v{v} after v{floor} was acknowledged")),
                _ => check.bad_reads.push(format!(
                    "key {i}: unexpected bytes {:?}",
                    String::from_utf8_lossy(&bytes)
                )),
            }
        }
        Err(e) => check.bad_reads.push(format!("key {i}: {e}")),
    }
}

/// Overwrites a small set of keys with rising versions on `config.threads`
/// writer threads while `readers` threads call `get` on the same keys and
/// one more thread compacts in a loop.
///
/// Each writer owns [`HOT_KEYS_PER_WRITER`] keys and publishes the version
/// of its last acknowledged put per key. A reader loads that version before
/// its get, so the get must return that version or a newer one, and the
/// bytes must be a value some writer actually put. Once the writers finish,
/// every reader sweeps all keys one last time.
///
/// # Panics
///
/// Panics if `config.threads` is zero, or if a put or compaction fails.
pub fn readers_during_writes_and_compaction(
    engine: &Engine,
    config: &StressConfig,
    readers: usize,
) -> ReadCheck {
    assert!(config.threads > 0, "at least one writer thread is required");
    let hot_keys = config.threads * HOT_KEYS_PER_WRITER;
    let max_version = config.writes_per_thread.div_ceil(HOT_KEYS_PER_WRITER);
    let acked: Vec<AtomicUsize> = (0..hot_keys).map(|_| AtomicUsize::new(0)).collect();
    let writers_done = AtomicBool::new(false);
    let compactions = AtomicUsize::new(0);

    let checks: Vec<ReadCheck> = thread::scope(|scope| {
        let acked = &acked;
        let writers_done = &writers_done;
        let compactions = &compactions;

        let reader_handles: Vec<_> = (0..readers)
            .map(|r| {
                scope.spawn(move || {
                    let mut check = ReadCheck::default();
                    let mut i = r % hot_keys;
                    while !writers_done.load(Ordering::Acquire) {
                        let floor = acked[i].load(Ordering::Acquire);
                        check_read(engine, i, floor, max_version, &mut check);
                        i = (i + 1) % hot_keys;
                    }
                    for i in 0..hot_keys {
                        let floor = acked[i].load(Ordering::Acquire);
                        check_read(engine, i, floor, max_version, &mut check);
                    }
                    check
                })
            })
            .collect();

        scope.spawn(move || {
            while !writers_done.load(Ordering::Acquire) {
                let result = engine.compact().expect("compaction failed");
                if !result.is_noop() {
                    compactions.fetch_add(1, Ordering::Relaxed);
                }
                thread::yield_now();
            }
        });

        let writer_handles: Vec<_> = (0..config.threads)
            .map(|t| {
                scope.spawn(move || {
                    for n in 0..config.writes_per_thread {
                        let i = t * HOT_KEYS_PER_WRITER + n % HOT_KEYS_PER_WRITER;
                        let version = n / HOT_KEYS_PER_WRITER + 1;
                        engine.put(&key(i), &value(i, version)).expect("put failed");
                        acked[i].store(version, Ordering::Release);
                    }
                })
            })
            .collect();
        let writes: Vec<_> = writer_handles.into_iter().map(|h| h.join()).collect();
        writers_done.store(true, Ordering::Release);
        for write in writes {
            write.expect("writer thread panicked");
        }

        reader_handles
            .into_iter()
            .map(|h| h.join().expect("reader thread panicked"))
            .collect()
    });

    let mut total = ReadCheck {
        compactions: compactions.into_inner(),
        ..ReadCheck::default()
    };
    for check in checks {
        total.reads += check.reads;
        total.hits += check.hits;
        total.bad_reads.extend(check.bad_reads);
        total.stale_reads.extend(check.stale_reads);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TempEngine;

    #[test]
    fn small_concurrent_run() {
        let fixture = TempEngine::small_segments(512);
        let config = StressConfig {
            threads: 4,
            writes_per_thread: 20,
        };
        let result = concurrent_writers(&fixture, &config);
        assert_eq!(result.successful_ops, 80);
        assert_eq!(result.failed_ops, 0);
        assert!(missing_after_concurrent_writers(&fixture, &config).is_empty());
    }

    #[test]
    fn written_version_parses_only_matching_values() {
        assert_eq!(written_version(3, &value(3, 12)), Some(12));
        assert_eq!(written_version(3, &value(4, 12)), None);
        assert_eq!(written_version(3, b"garbage"), None);
    }

    #[test]
    fn small_read_check_is_clean() {
        let fixture = TempEngine::small_segments(256);
        let config = StressConfig {
            threads: 2,
            writes_per_thread: 64,
        };
        let check = readers_during_writes_and_compaction(&fixture, &config, 2);
        assert!(check.is_clean(), "{check:?}");
        assert!(check.reads > 0);
    }
}
