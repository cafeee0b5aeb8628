//! Configuration for dawnkv
//!
//! Centralized configuration with sensible defaults.

use std::time::Duration;

use crate::error::{DawnError, Result};

/// Main configuration for a dawnkv instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Flush Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: whether a flush also fsyncs the log file
    pub sync_strategy: SyncStrategy,

    /// Flush the write buffer once it holds this many bytes
    pub buffer_limit: usize,

    /// Flush the write buffer from a background thread at this interval.
    /// `None` means writes are flushed only explicitly, on buffer overflow,
    /// or on close.
    pub flush_interval: Option<Duration>,

    // -------------------------------------------------------------------------
    // Compaction Configuration
    // -------------------------------------------------------------------------
    /// Minimum fraction of superseded records (0.0..=1.0) before a
    /// non-forced compaction rewrites the file
    pub compaction_threshold: f64,
}

/// Log sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Hand bytes to the OS on flush, never fsync (fast, survives process crashes only)
    OsBuffered,

    /// fsync after every flush (safest, slowest)
    EveryFlush,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_strategy: SyncStrategy::EveryFlush,
            buffer_limit: 64 * 1024, // 64 KB
            flush_interval: None,
            compaction_threshold: 0.5,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.compaction_threshold) {
            return Err(DawnError::Config(format!(
                "compaction_threshold must be within 0.0..=1.0, got {}",
                self.compaction_threshold
            )));
        }
        if self.flush_interval == Some(Duration::ZERO) {
            return Err(DawnError::Config(
                "flush_interval must be non-zero".to_string(),
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
    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the write buffer limit (in bytes)
    pub fn buffer_limit(mut self, bytes: usize) -> Self {
        self.config.buffer_limit = bytes;
        self
    }

    /// Enable background flushing at the given interval
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config.flush_interval = Some(interval);
        self
    }

    /// Set the superseded-record fraction that triggers compaction
    pub fn compaction_threshold(mut self, threshold: f64) -> Self {
        self.config.compaction_threshold = threshold;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
