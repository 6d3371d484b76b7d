pub mod defaults;
pub mod gossip_config;
pub mod observability_config;
pub mod sync_config;
pub mod topology_config;

use serde::{Deserialize, Serialize};

pub use gossip_config::GossipConfig;
pub use observability_config::ObservabilityConfig;
pub use sync_config::SyncConfig;
pub use topology_config::TopologyConfig;

use crate::errors::{HiveError, HiveResult};

/// Top-level configuration aggregating all subsystem configs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HiveConfig {
    pub gossip: GossipConfig,
    pub topology: TopologyConfig,
    pub sync: SyncConfig,
    pub observability: ObservabilityConfig,
}

impl HiveConfig {
    /// Load config from a TOML string, falling back to defaults for missing fields.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Reject settings the protocol cannot run with.
    pub fn validate(&self) -> HiveResult<()> {
        validate_quorum_threshold(self.gossip.min_quorum_threshold)?;
        if self.gossip.fanout == 0 {
            return Err(HiveError::ConfigError("gossip.fanout must be at least 1".into()));
        }
        if self.gossip.batch_size == 0 {
            return Err(HiveError::ConfigError("gossip.batch_size must be at least 1".into()));
        }
        if self.gossip.max_ttl == 0 {
            return Err(HiveError::ConfigError("gossip.max_ttl must be at least 1".into()));
        }
        if self.gossip.failure_threshold == 0 {
            return Err(HiveError::ConfigError(
                "gossip.failure_threshold must be at least 1".into(),
            ));
        }
        if self.topology.replication_factor == 0 {
            return Err(HiveError::ConfigError(
                "topology.replication_factor must be at least 1".into(),
            ));
        }
        let pressure = self.topology.memory_pressure_threshold;
        if !(pressure > 0.0 && pressure <= 1.0) {
            return Err(HiveError::ConfigError(format!(
                "topology.memory_pressure_threshold {pressure} must be in (0, 1]"
            )));
        }
        Ok(())
    }
}

/// Quorum thresholds must lie in (0, 1].
pub fn validate_quorum_threshold(threshold: f64) -> HiveResult<()> {
    if threshold > 0.0 && threshold <= 1.0 {
        Ok(())
    } else {
        Err(HiveError::InvalidQuorumThreshold { threshold })
    }
}
