//! Membership changes with their knock-on effects.
//!
//! Adding or removing an agent re-runs the optimizer. With sharding enabled,
//! joins trigger a full rebalance and departures hand the leaver's shards to
//! the remaining agents.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{info, warn};

use hive_core::config::TopologyConfig;
use hive_core::errors::TopologyError;
use hive_core::models::{AgentId, ShardId};

use crate::node::AgentNode;
use crate::optimizer::{OptimizationOutcome, TopologyOptimizer};
use crate::partition::PartitionPlanner;
use crate::shard::{NoopShardCoordinator, ShardCoordinator};
use crate::topology::MemoryTopology;

pub struct TopologyManager {
    topology: MemoryTopology,
    optimizer: TopologyOptimizer,
    planner: PartitionPlanner,
    coordinator: Arc<dyn ShardCoordinator>,
    sharding_enabled: bool,
    shards: Vec<ShardId>,
}

impl TopologyManager {
    pub fn new(config: &TopologyConfig) -> Self {
        Self::with_coordinator(config, Arc::new(NoopShardCoordinator))
    }

    pub fn with_coordinator(config: &TopologyConfig, coordinator: Arc<dyn ShardCoordinator>) -> Self {
        let shards = (0..config.shard_count)
            .map(|i| ShardId(format!("shard-{i:04}")))
            .collect();
        Self {
            topology: MemoryTopology::new(config),
            optimizer: TopologyOptimizer::from_config(config),
            planner: PartitionPlanner::new(config.partition_strategy, config.virtual_nodes),
            coordinator,
            sharding_enabled: config.sharding_enabled,
            shards,
        }
    }

    pub fn topology(&self) -> &MemoryTopology {
        &self.topology
    }

    pub fn topology_mut(&mut self) -> &mut MemoryTopology {
        &mut self.topology
    }

    /// Add an agent, re-optimize, and rebalance shards.
    pub fn add_agent(
        &mut self,
        node: AgentNode,
        memory_pressure: f64,
    ) -> Result<OptimizationOutcome, TopologyError> {
        let agent_id = node.agent_id.clone();
        self.topology.add_agent(node)?;
        info!(agent_id = %agent_id, nodes = self.topology.node_count(), "agent added");
        Ok(self.after_join(memory_pressure))
    }

    /// Add or refresh an agent. Only a previously unknown agent triggers
    /// optimization; the outcome is `None` for refreshes.
    pub fn upsert_agent(&mut self, node: AgentNode, memory_pressure: f64) -> Option<OptimizationOutcome> {
        let agent_id = node.agent_id.clone();
        if self.topology.upsert_agent(node) {
            info!(agent_id = %agent_id, nodes = self.topology.node_count(), "agent discovered");
            Some(self.after_join(memory_pressure))
        } else {
            None
        }
    }

    /// Remove an agent, re-optimize, and move its shards elsewhere.
    pub fn remove_agent(
        &mut self,
        agent_id: &AgentId,
        memory_pressure: f64,
    ) -> Result<(AgentNode, OptimizationOutcome), TopologyError> {
        let removed = self.topology.remove_agent(agent_id)?;
        info!(agent_id = %agent_id, nodes = self.topology.node_count(), "agent removed");
        let outcome = self.optimizer.optimize(&mut self.topology, memory_pressure);
        if self.sharding_enabled {
            self.redistribute(&removed.shards);
        }
        Ok((removed, outcome))
    }

    pub fn optimize(&mut self, memory_pressure: f64) -> OptimizationOutcome {
        self.optimizer.optimize(&mut self.topology, memory_pressure)
    }

    fn after_join(&mut self, memory_pressure: f64) -> OptimizationOutcome {
        let outcome = self.optimizer.optimize(&mut self.topology, memory_pressure);
        if self.sharding_enabled {
            self.rebalance();
        }
        outcome
    }

    /// Recompute ownership of every shard across the current agents.
    fn rebalance(&mut self) {
        let agents: Vec<AgentId> = self.topology.nodes().map(|n| n.agent_id.clone()).collect();
        let plan = self.planner.assign(&self.shards, &agents);
        for id in &agents {
            if let Some(node) = self.topology.node_mut(id) {
                node.shards = plan
                    .iter()
                    .filter(|(_, owner)| *owner == id)
                    .map(|(shard, _)| shard.clone())
                    .collect();
            }
        }
        let nodes: Vec<AgentNode> = self.topology.nodes().cloned().collect();
        self.coordinator.rebalance_shards(&nodes);
    }

    /// Place orphaned shards on the remaining agents.
    fn redistribute(&mut self, orphaned: &BTreeSet<ShardId>) {
        if orphaned.is_empty() {
            return;
        }
        let orphaned: Vec<ShardId> = orphaned.iter().cloned().collect();
        let agents: Vec<AgentId> = self.topology.nodes().map(|n| n.agent_id.clone()).collect();
        if agents.is_empty() {
            warn!(shards = orphaned.len(), "no agents left to take orphaned shards");
            return;
        }
        for (shard, owner) in self.planner.assign(&orphaned, &agents) {
            if let Some(node) = self.topology.node_mut(&owner) {
                node.shards.insert(shard);
            }
        }
        let nodes: Vec<AgentNode> = self.topology.nodes().cloned().collect();
        self.coordinator.redistribute_shards(&orphaned, &nodes);
    }
}
