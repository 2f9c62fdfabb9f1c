//! Benchmark utilities.

use bitlog_core::{Config, Engine};
use rand::Rng;
use tempfile::TempDir;

/// Generate random data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate `count` distinct keys.
pub fn generate_keys(count: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| format!("bench-key-{i:08}").into_bytes())
        .collect()
}

/// Opens an engine in a fresh temporary directory.
///
/// The directory lives as long as the returned guard.
pub fn temp_engine(config: Config) -> (TempDir, Engine) {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let engine = Engine::open_with_config(dir.path(), config).expect("Failed to open engine");
    (dir, engine)
}
