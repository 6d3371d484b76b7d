use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults;

/// Epidemic dissemination and failure-detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GossipConfig {
    /// Base number of peers each message is forwarded to.
    pub fanout: usize,
    /// Propagation round period.
    pub gossip_interval_ms: u64,
    /// Anti-entropy period.
    pub sync_interval_ms: u64,
    /// Hop budget for newly originated messages.
    pub max_ttl: u32,
    /// Missed heartbeat windows before a node is marked inactive.
    pub failure_threshold: u32,
    /// Messages drained from the pending queue per round.
    pub batch_size: usize,
    /// Scale fanout down and shed load when the pending queue backs up.
    pub adaptive_gossip: bool,
    /// Fraction of known nodes that must be active for quorum. In (0, 1].
    pub min_quorum_threshold: f64,
    /// A heartbeat window is `gossip_interval_ms * failure_window_multiplier`.
    pub failure_window_multiplier: u32,
    /// Eviction window for the seen-message cache.
    pub seen_cache_ttl_secs: u64,
    pub seen_cache_capacity: u64,
    /// Peers contacted per anti-entropy cycle.
    pub anti_entropy_peers: usize,
    pub initial_reliability: f64,
    /// Weight of the newest sample in the reliability moving average.
    pub reliability_alpha: f64,
    /// Reliability lost when a node crosses the failure threshold.
    pub failure_reliability_penalty: f64,
    /// Reliability lost on a single failed send.
    pub send_failure_penalty: f64,
    pub send_timeout_ms: u64,
    pub max_pending_messages: usize,
}

impl GossipConfig {
    pub fn gossip_interval(&self) -> Duration {
        Duration::from_millis(self.gossip_interval_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Silence longer than this counts as one missed heartbeat window.
    pub fn failure_window(&self) -> Duration {
        Duration::from_millis(self.gossip_interval_ms * u64::from(self.failure_window_multiplier))
    }
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            fanout: defaults::DEFAULT_FANOUT,
            gossip_interval_ms: defaults::DEFAULT_GOSSIP_INTERVAL_MS,
            sync_interval_ms: defaults::DEFAULT_SYNC_INTERVAL_MS,
            max_ttl: defaults::DEFAULT_MAX_TTL,
            failure_threshold: defaults::DEFAULT_FAILURE_THRESHOLD,
            batch_size: defaults::DEFAULT_BATCH_SIZE,
            adaptive_gossip: defaults::DEFAULT_ADAPTIVE_GOSSIP,
            min_quorum_threshold: defaults::DEFAULT_MIN_QUORUM_THRESHOLD,
            failure_window_multiplier: defaults::DEFAULT_FAILURE_WINDOW_MULTIPLIER,
            seen_cache_ttl_secs: defaults::DEFAULT_SEEN_CACHE_TTL_SECS,
            seen_cache_capacity: defaults::DEFAULT_SEEN_CACHE_CAPACITY,
            anti_entropy_peers: defaults::DEFAULT_ANTI_ENTROPY_PEERS,
            initial_reliability: defaults::DEFAULT_INITIAL_RELIABILITY,
            reliability_alpha: defaults::DEFAULT_RELIABILITY_ALPHA,
            failure_reliability_penalty: defaults::DEFAULT_FAILURE_RELIABILITY_PENALTY,
            send_failure_penalty: defaults::DEFAULT_SEND_FAILURE_PENALTY,
            send_timeout_ms: defaults::DEFAULT_SEND_TIMEOUT_MS,
            max_pending_messages: defaults::DEFAULT_MAX_PENDING_MESSAGES,
        }
    }
}
