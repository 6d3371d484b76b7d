use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults;
use crate::models::{ConsistencyLevel, PartitionStrategy};

/// Topology optimizer and sharding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    pub replication_factor: usize,
    pub partition_strategy: PartitionStrategy,
    pub consistency_level: ConsistencyLevel,
    /// Swarms smaller than this are fully meshed.
    pub mesh_node_limit: usize,
    /// Memory pressure above this selects the hybrid shape.
    pub memory_pressure_threshold: f64,
    pub optimization_interval_ms: u64,
    pub sharding_enabled: bool,
    pub shard_count: usize,
    /// Points per node on the consistent-hash ring.
    pub virtual_nodes: usize,
}

impl TopologyConfig {
    pub fn optimization_interval(&self) -> Duration {
        Duration::from_millis(self.optimization_interval_ms)
    }
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            replication_factor: defaults::DEFAULT_REPLICATION_FACTOR,
            partition_strategy: PartitionStrategy::default(),
            consistency_level: ConsistencyLevel::default(),
            mesh_node_limit: defaults::DEFAULT_MESH_NODE_LIMIT,
            memory_pressure_threshold: defaults::DEFAULT_MEMORY_PRESSURE_THRESHOLD,
            optimization_interval_ms: defaults::DEFAULT_OPTIMIZATION_INTERVAL_MS,
            sharding_enabled: defaults::DEFAULT_SHARDING_ENABLED,
            shard_count: defaults::DEFAULT_SHARD_COUNT,
            virtual_nodes: defaults::DEFAULT_VIRTUAL_NODES,
        }
    }
}
