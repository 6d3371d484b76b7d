//! Central metrics registry.
//!
//! [`MetricsCollector`] owns the gossip and sync collectors. Counters are
//! atomics so periodic tasks record through a shared reference.

pub mod gossip_metrics;
pub mod sync_metrics;

use serde::{Deserialize, Serialize};

pub use gossip_metrics::{GossipMetrics, GossipSnapshot};
pub use sync_metrics::{SyncMetrics, SyncSnapshot};

#[derive(Debug, Default)]
pub struct MetricsCollector {
    pub gossip: GossipMetrics,
    pub sync: SyncMetrics,
}

/// Point-in-time copy of every collector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub gossip: GossipSnapshot,
    pub sync: SyncSnapshot,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            gossip: self.gossip.snapshot(),
            sync: self.sync.snapshot(),
        }
    }

    /// Reset all metrics (used by emergency cleanup and tests).
    pub fn reset(&self) {
        self.gossip.reset();
        self.sync.reset();
    }
}
