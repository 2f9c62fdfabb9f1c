//! Engine configuration.

/// Default maximum segment size (10 MiB).
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 10 * 1024 * 1024;

/// Configuration for opening an engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Size in bytes past which the active segment is sealed and a new one
    /// is started. A single record larger than this still fits in an empty
    /// segment.
    pub max_segment_size: u64,

    /// Whether to fsync the active segment after every write before
    /// acknowledging it.
    pub sync_on_write: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            sync_on_write: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets maximum segment file size.
    #[must_use]
    pub const fn max_segment_size(mut self, size: u64) -> Self {
        self.max_segment_size = size;
        self
    }

    /// Sets whether to sync after every write.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.create_if_missing);
        assert!(config.sync_on_write);
        assert_eq!(config.max_segment_size, 10 * 1024 * 1024);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .create_if_missing(false)
            .sync_on_write(false)
            .max_segment_size(1024);

        assert!(!config.create_if_missing);
        assert!(!config.sync_on_write);
        assert_eq!(config.max_segment_size, 1024);
    }
}
