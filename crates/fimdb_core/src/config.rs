//! Database configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default on-disk location of the FIM database, relative to the agent root.
pub const DEFAULT_DISK_PATH: &str = "queue/fim/db/fim.db";

/// Where the snapshot lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageMode {
    /// Ephemeral store, lost when the process exits.
    Memory,
    /// Journal file at the given path.
    Disk(PathBuf),
}

impl StorageMode {
    /// Disk storage at [`DEFAULT_DISK_PATH`].
    #[must_use]
    pub fn default_disk() -> Self {
        Self::Disk(PathBuf::from(DEFAULT_DISK_PATH))
    }

    /// Returns the database path, or `None` for memory storage.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Memory => None,
            Self::Disk(path) => Some(path),
        }
    }
}

impl Default for StorageMode {
    fn default() -> Self {
        Self::default_disk()
    }
}

/// Configuration for opening a FIM database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Memory or disk storage.
    pub storage: StorageMode,

    /// Interval between reconciliation rounds with the manager.
    pub sync_interval: Duration,

    /// Maximum number of monitored files (0 = unlimited).
    pub file_limit: u64,

    /// Maximum number of monitored registry values (0 = unlimited).
    pub value_limit: u64,

    /// Whether the registry tables are part of the schema.
    pub registry: bool,

    /// Whether closing a transaction syncs the journal to disk.
    pub sync_on_close: bool,

    /// Journal size in bytes above which it is compacted on close (0 = never).
    pub compact_threshold: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageMode::default(),
            sync_interval: Duration::from_secs(300),
            file_limit: 100_000,
            value_limit: 100_000,
            registry: cfg!(windows),
            sync_on_close: true,
            compact_threshold: 16 * 1024 * 1024, // 16 MB
        }
    }
}

impl Config {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for an in-memory configuration.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default().storage(StorageMode::Memory)
    }

    /// Sets the storage mode.
    #[must_use]
    pub fn storage(mut self, storage: StorageMode) -> Self {
        self.storage = storage;
        self
    }

    /// Sets the reconciliation interval.
    #[must_use]
    pub const fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the file row limit.
    #[must_use]
    pub const fn file_limit(mut self, limit: u64) -> Self {
        self.file_limit = limit;
        self
    }

    /// Sets the registry value row limit.
    #[must_use]
    pub const fn value_limit(mut self, limit: u64) -> Self {
        self.value_limit = limit;
        self
    }

    /// Enables or disables the registry tables.
    #[must_use]
    pub const fn registry(mut self, enabled: bool) -> Self {
        self.registry = enabled;
        self
    }

    /// Sets whether closing a transaction syncs the journal.
    #[must_use]
    pub const fn sync_on_close(mut self, value: bool) -> Self {
        self.sync_on_close = value;
        self
    }

    /// Sets the journal compaction threshold.
    #[must_use]
    pub const fn compact_threshold(mut self, bytes: u64) -> Self {
        self.compact_threshold = bytes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.storage.path(), Some(Path::new(DEFAULT_DISK_PATH)));
        assert_eq!(config.registry, cfg!(windows));
        assert!(config.sync_on_close);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::in_memory()
            .file_limit(2)
            .value_limit(5)
            .registry(true)
            .sync_interval(Duration::from_secs(60))
            .compact_threshold(0);

        assert_eq!(config.storage, StorageMode::Memory);
        assert!(config.storage.path().is_none());
        assert_eq!(config.file_limit, 2);
        assert_eq!(config.value_limit, 5);
        assert!(config.registry);
        assert_eq!(config.sync_interval, Duration::from_secs(60));
        assert_eq!(config.compact_threshold, 0);
    }
}
