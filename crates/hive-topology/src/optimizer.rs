//! Topology selection.
//!
//! Rules are evaluated in order; the first match wins:
//!
//! | condition                              | shape          |
//! |----------------------------------------|----------------|
//! | fewer agents than `mesh_node_limit`    | `Mesh`         |
//! | strong consistency required            | `Hierarchical` |
//! | memory pressure above threshold        | `Hybrid`       |
//! | otherwise                              | `Ring`         |

use serde::{Deserialize, Serialize};
use tracing::info;

use hive_core::config::TopologyConfig;
use hive_core::models::{ConsistencyLevel, TopologyType};

use crate::topology::MemoryTopology;

/// Swarm characteristics the optimizer looks at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwarmProfile {
    pub node_count: usize,
    pub average_latency_ms: f64,
    /// Fraction of local capacity in use, in [0, 1].
    pub memory_pressure: f64,
    pub consistency: ConsistencyLevel,
}

impl SwarmProfile {
    pub fn of(topology: &MemoryTopology, memory_pressure: f64) -> Self {
        Self {
            node_count: topology.node_count(),
            average_latency_ms: topology.average_latency_ms(),
            memory_pressure,
            consistency: topology.consistency_level,
        }
    }
}

/// Result of one optimization pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationOutcome {
    pub previous: TopologyType,
    pub selected: TopologyType,
    pub changed: bool,
    pub connection_count: usize,
    pub profile: SwarmProfile,
}

#[derive(Debug, Clone)]
pub struct TopologyOptimizer {
    mesh_node_limit: usize,
    memory_pressure_threshold: f64,
}

impl TopologyOptimizer {
    pub fn new(mesh_node_limit: usize, memory_pressure_threshold: f64) -> Self {
        Self {
            mesh_node_limit,
            memory_pressure_threshold,
        }
    }

    pub fn from_config(config: &TopologyConfig) -> Self {
        Self::new(config.mesh_node_limit, config.memory_pressure_threshold)
    }

    pub fn select(&self, profile: &SwarmProfile) -> TopologyType {
        if profile.node_count < self.mesh_node_limit {
            TopologyType::Mesh
        } else if profile.consistency == ConsistencyLevel::Strong {
            TopologyType::Hierarchical
        } else if profile.memory_pressure > self.memory_pressure_threshold {
            TopologyType::Hybrid
        } else {
            TopologyType::Ring
        }
    }

    /// Select a shape for `topology` and rebuild its connections.
    pub fn optimize(&self, topology: &mut MemoryTopology, memory_pressure: f64) -> OptimizationOutcome {
        let profile = SwarmProfile::of(topology, memory_pressure);
        let previous = topology.topology_type;
        let selected = self.select(&profile);
        let changed = topology.apply_type(selected);
        if changed {
            info!(
                from = ?previous,
                to = ?selected,
                nodes = profile.node_count,
                avg_latency_ms = profile.average_latency_ms,
                memory_pressure = profile.memory_pressure,
                "topology changed"
            );
        }
        OptimizationOutcome {
            previous,
            selected,
            changed,
            connection_count: topology.connection_count(),
            profile,
        }
    }
}

impl Default for TopologyOptimizer {
    fn default() -> Self {
        Self::from_config(&TopologyConfig::default())
    }
}
