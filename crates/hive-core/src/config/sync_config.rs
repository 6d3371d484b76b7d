use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults;

/// Delta synchronization settings for the memory manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Re-propagate applied deltas that arrived as direct messages.
    pub dissemination_enabled: bool,
    /// Store size treated as full memory pressure.
    pub max_entries: usize,
    pub compression_level: i32,
    pub applied_delta_retention_secs: u64,
    pub max_buffered_deltas: usize,
    /// Buffered deltas older than this are released despite missing dependencies.
    pub dependency_wait_ms: u64,
    pub metrics_interval_ms: u64,
}

impl SyncConfig {
    pub fn dependency_wait(&self) -> Duration {
        Duration::from_millis(self.dependency_wait_ms)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_interval_ms)
    }

    pub fn applied_delta_retention(&self) -> Duration {
        Duration::from_secs(self.applied_delta_retention_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            dissemination_enabled: defaults::DEFAULT_DISSEMINATION_ENABLED,
            max_entries: defaults::DEFAULT_MAX_ENTRIES,
            compression_level: defaults::DEFAULT_COMPRESSION_LEVEL,
            applied_delta_retention_secs: defaults::DEFAULT_APPLIED_DELTA_RETENTION_SECS,
            max_buffered_deltas: defaults::DEFAULT_MAX_BUFFERED_DELTAS,
            dependency_wait_ms: defaults::DEFAULT_DEPENDENCY_WAIT_MS,
            metrics_interval_ms: defaults::DEFAULT_METRICS_INTERVAL_MS,
        }
    }
}
