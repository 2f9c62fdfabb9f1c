//! Test fixtures and engine helpers.

use bitlog_core::{Config, Engine};
use std::path::Path;
use tempfile::TempDir;

/// An engine in a temporary directory that is removed on drop.
pub struct TempEngine {
    engine: Option<Engine>,
    config: Config,
    dir: TempDir,
}

impl TempEngine {
    /// Opens an engine with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Opens an engine with `config`.
    pub fn with_config(config: Config) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let engine = Engine::open_with_config(dir.path(), config.clone())
            .expect("Failed to open engine");
        Self {
            engine: Some(engine),
            config,
            dir,
        }
    }

    /// Opens an engine that rotates once the active segment holds
    /// `max_segment_size` bytes and skips fsync.
    pub fn small_segments(max_segment_size: u64) -> Self {
        Self::with_config(
            Config::new()
                .max_segment_size(max_segment_size)
                .sync_on_write(false),
        )
    }

    /// The store directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The configuration used for every open.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Closes the engine, leaving the directory in place.
    pub fn close(&mut self) {
        if let Some(engine) = self.engine.take() {
            engine.close().expect("Failed to close engine");
        }
    }

    /// Closes and opens the engine again on the same directory.
    pub fn reopen(&mut self) {
        self.close();
        let engine = Engine::open_with_config(self.dir.path(), self.config.clone())
            .expect("Failed to reopen engine");
        self.engine = Some(engine);
    }

    /// Closes the engine and runs `f` on the directory, then reopens.
    ///
    /// Used to damage files while nothing holds them open.
    pub fn while_closed<F>(&mut self, f: F)
    where
        F: FnOnce(&Path),
    {
        self.close();
        f(self.dir.path());
        self.reopen();
    }

    /// Tries to open a second engine on the closed directory.
    pub fn try_open(&self) -> bitlog_core::CoreResult<Engine> {
        Engine::open_with_config(self.dir.path(), self.config.clone())
    }
}

impl Default for TempEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TempEngine {
    type Target = Engine;

    fn deref(&self) -> &Self::Target {
        self.engine.as_ref().expect("Engine is closed")
    }
}

/// Runs `f` with a fresh temporary engine.
///
/// # Example
///
/// ```rust,ignore
/// with_temp_engine(|engine| {
///     engine.put(b"k", b"v").unwrap();
/// });
/// ```
pub fn with_temp_engine<F, R>(f: F) -> R
where
    F: FnOnce(&Engine) -> R,
{
    let fixture = TempEngine::new();
    f(&fixture)
}

/// Key used by the helpers for index `i`.
pub fn key(i: usize) -> Vec<u8> {
    format!("key-{i:06}").into_bytes()
}

/// Value used by the helpers for index `i` and `version`.
pub fn value(i: usize, version: usize) -> Vec<u8> {
    format!("value-{i}-v{version}").into_bytes()
}

/// Writes `count` keys with version 0.
pub fn populate(engine: &Engine, count: usize) {
    for i in 0..count {
        engine.put(&key(i), &value(i, 0)).expect("Failed to populate");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reopen_keeps_data() {
        let mut fixture = TempEngine::new();
        populate(&fixture, 5);
        fixture.reopen();
        assert_eq!(fixture.len(), 5);
        assert_eq!(fixture.get(&key(3)).unwrap(), Some(value(3, 0)));
    }

    #[test]
    fn with_temp_engine_is_isolated() {
        let len = with_temp_engine(|engine| {
            engine.put(b"a", b"1").unwrap();
            engine.len()
        });
        assert_eq!(len, 1);
        assert_eq!(with_temp_engine(|engine| engine.len()), 0);
    }
}
