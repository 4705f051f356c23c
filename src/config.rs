//! Configuration for AtlasTS
//!
//! Node-wide settings shared by every processor through the storage context.

use std::path::PathBuf;

use crate::error::{AtlasError, Result};

/// Main configuration for an AtlasTS storage node
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── wal/{node}/          (write-ahead log segments)
    ///     └── {processor}/         (one durable file per processor)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Whether processors log inserts/deletes to a WAL node
    pub wal_enabled: bool,

    /// How often log segments are fsynced
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // Buffer Configuration
    // -------------------------------------------------------------------------
    /// Buffered bytes per processor before a flush is triggered
    pub memtable_size_threshold: u64,

    /// Process-wide budget for buffered bytes across all processors
    pub memory_budget: u64,

    /// Fraction of the budget at which inserts start logging warnings
    pub memory_warning_ratio: f64,

    /// Fraction of the budget at which inserts are rejected
    pub memory_dangerous_ratio: f64,

    // -------------------------------------------------------------------------
    // Flush Configuration
    // -------------------------------------------------------------------------
    /// Number of flush worker threads shared by all processors
    pub flush_pool_size: usize,

    /// Capacity of the flush task queue
    pub flush_queue_capacity: usize,

    /// What happens to buffered data when a flush generation fails
    pub flush_failure_policy: FlushFailurePolicy,

    /// Versions reserved per save of a file-backed version controller
    pub version_save_interval: u64,
}

/// When a WAL segment is fsynced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after each entry
    EveryWrite,

    /// fsync once `count` entries are unsynced (and at every segment seal)
    EveryNEntries { count: usize },
}

/// Handling of a flush generation whose task failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushFailurePolicy {
    /// Drop the generation's data from memory; its WAL segments are kept
    /// out of later retirement and replayed at the next open
    #[default]
    Discard,

    /// Put the generation's data back in front of the work buffer
    Restore,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./atlasts_data"),
            wal_enabled: true,
            wal_sync_strategy: WalSyncStrategy::EveryNEntries { count: 100 },
            memtable_size_threshold: 128 * 1024 * 1024, // 128 MB
            memory_budget: 1024 * 1024 * 1024,          // 1 GB
            memory_warning_ratio: 0.8,
            memory_dangerous_ratio: 0.9,
            flush_pool_size: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            flush_queue_capacity: 64,
            flush_failure_policy: FlushFailurePolicy::Discard,
            version_save_interval: 100,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Directory holding WAL nodes
    pub fn wal_dir(&self) -> PathBuf {
        self.data_dir.join("wal")
    }

    /// Absolute warning threshold in bytes
    pub fn memory_warning_threshold(&self) -> u64 {
        (self.memory_budget as f64 * self.memory_warning_ratio) as u64
    }

    /// Absolute dangerous threshold in bytes
    pub fn memory_dangerous_threshold(&self) -> u64 {
        (self.memory_budget as f64 * self.memory_dangerous_ratio) as u64
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let in_range = |r: f64| r > 0.0 && r <= 1.0;
        if !in_range(self.memory_warning_ratio) || !in_range(self.memory_dangerous_ratio) {
            return Err(AtlasError::Config(format!(
                "memory ratios must be in (0, 1], got warning={} dangerous={}",
                self.memory_warning_ratio, self.memory_dangerous_ratio
            )));
        }
        if self.memory_warning_ratio > self.memory_dangerous_ratio {
            return Err(AtlasError::Config(
                "memory warning ratio exceeds dangerous ratio".to_string(),
            ));
        }
        if self.flush_pool_size == 0 {
            return Err(AtlasError::Config("flush pool size must be > 0".to_string()));
        }
        if self.flush_queue_capacity == 0 {
            return Err(AtlasError::Config(
                "flush queue capacity must be > 0".to_string(),
            ));
        }
        if self.version_save_interval == 0 {
            return Err(AtlasError::Config(
                "version save interval must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Enable or disable the WAL
    pub fn wal_enabled(mut self, enabled: bool) -> Self {
        self.config.wal_enabled = enabled;
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the per-processor flush threshold (in bytes)
    pub fn memtable_size_threshold(mut self, size: u64) -> Self {
        self.config.memtable_size_threshold = size;
        self
    }

    /// Set the process-wide memory budget (in bytes)
    pub fn memory_budget(mut self, size: u64) -> Self {
        self.config.memory_budget = size;
        self
    }

    /// Set the warning and dangerous fractions of the memory budget
    pub fn memory_ratios(mut self, warning: f64, dangerous: f64) -> Self {
        self.config.memory_warning_ratio = warning;
        self.config.memory_dangerous_ratio = dangerous;
        self
    }

    /// Set the number of flush worker threads
    pub fn flush_pool_size(mut self, workers: usize) -> Self {
        self.config.flush_pool_size = workers;
        self
    }

    /// Set the flush task queue capacity
    pub fn flush_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.flush_queue_capacity = capacity;
        self
    }

    /// Set the flush failure policy
    pub fn flush_failure_policy(mut self, policy: FlushFailurePolicy) -> Self {
        self.config.flush_failure_policy = policy;
        self
    }

    /// Set the version reservation step
    pub fn version_save_interval(mut self, interval: u64) -> Self {
        self.config.version_save_interval = interval;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
