//! The swarm graph.
//!
//! Nodes are kept in a `BTreeMap` so every shape rebuild walks agents in the
//! same order on every replica. Rebuilding keeps the measured metrics of
//! edges that survive the change.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use hive_core::config::TopologyConfig;
use hive_core::errors::TopologyError;
use hive_core::models::{AgentId, AgentRole, ConsistencyLevel, PartitionStrategy, TopologyType};

use crate::connection::Connection;
use crate::node::AgentNode;

/// Agents and directed connections plus the settings that shape them.
#[derive(Debug, Clone)]
pub struct MemoryTopology {
    pub topology_type: TopologyType,
    pub replication_factor: usize,
    pub partition_strategy: PartitionStrategy,
    pub consistency_level: ConsistencyLevel,
    nodes: BTreeMap<AgentId, AgentNode>,
    connections: BTreeMap<(AgentId, AgentId), Connection>,
}

impl MemoryTopology {
    pub fn new(config: &TopologyConfig) -> Self {
        Self {
            topology_type: TopologyType::default(),
            replication_factor: config.replication_factor.max(1),
            partition_strategy: config.partition_strategy,
            consistency_level: config.consistency_level,
            nodes: BTreeMap::new(),
            connections: BTreeMap::new(),
        }
    }

    /// Insert a new agent and wire it into the current shape.
    pub fn add_agent(&mut self, node: AgentNode) -> Result<(), TopologyError> {
        if self.nodes.contains_key(&node.agent_id) {
            return Err(TopologyError::DuplicateAgent(node.agent_id.to_string()));
        }
        self.nodes.insert(node.agent_id.clone(), node);
        self.rebuild_connections();
        Ok(())
    }

    /// Insert or refresh an agent. Returns `true` if it was not known before.
    ///
    /// Existing entries keep their shards and merged clock; address, role,
    /// capabilities, and trust are taken from `node`.
    pub fn upsert_agent(&mut self, node: AgentNode) -> bool {
        match self.nodes.get_mut(&node.agent_id) {
            Some(existing) => {
                existing.address = node.address;
                existing.role = node.role;
                existing.capacity = node.capacity;
                existing.capabilities = node.capabilities;
                existing.trust_level = node.trust_level;
                existing.touch(node.last_seen, Some(&node.clock));
                false
            }
            None => {
                self.nodes.insert(node.agent_id.clone(), node);
                self.rebuild_connections();
                true
            }
        }
    }

    /// Remove an agent and every connection touching it.
    pub fn remove_agent(&mut self, agent_id: &AgentId) -> Result<AgentNode, TopologyError> {
        let node = self
            .nodes
            .remove(agent_id)
            .ok_or_else(|| TopologyError::UnknownAgent(agent_id.to_string()))?;
        self.connections
            .retain(|(from, to), _| from != agent_id && to != agent_id);
        self.rebuild_connections();
        Ok(node)
    }

    pub fn node(&self, agent_id: &AgentId) -> Option<&AgentNode> {
        self.nodes.get(agent_id)
    }

    pub fn node_mut(&mut self, agent_id: &AgentId) -> Option<&mut AgentNode> {
        self.nodes.get_mut(agent_id)
    }

    pub fn contains(&self, agent_id: &AgentId) -> bool {
        self.nodes.contains_key(agent_id)
    }

    /// Nodes in agent-id order.
    pub fn nodes(&self) -> impl Iterator<Item = &AgentNode> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connection(&self, from: &AgentId, to: &AgentId) -> Option<&Connection> {
        self.connections.get(&(from.clone(), to.clone()))
    }

    /// Agents `agent_id` has an outgoing connection to.
    pub fn neighbors(&self, agent_id: &AgentId) -> Vec<&AgentId> {
        self.connections
            .keys()
            .filter(|(from, _)| from == agent_id)
            .map(|(_, to)| to)
            .collect()
    }

    /// Record a measured round trip. Creates the edge if both ends are known
    /// but the current shape does not connect them.
    pub fn record_round_trip(
        &mut self,
        from: &AgentId,
        to: &AgentId,
        latency_ms: f64,
        success: bool,
        alpha: f64,
        now: DateTime<Utc>,
    ) {
        if !self.nodes.contains_key(from) || !self.nodes.contains_key(to) || from == to {
            return;
        }
        self.connections
            .entry((from.clone(), to.clone()))
            .or_insert_with(|| Connection::new(from.clone(), to.clone()))
            .record_round_trip(latency_ms, success, alpha, now);
    }

    /// Mean latency over connections that have completed a round trip.
    pub fn average_latency_ms(&self) -> f64 {
        let measured: Vec<f64> = self
            .connections
            .values()
            .filter(|c| c.last_sync.is_some())
            .map(|c| c.latency_ms)
            .collect();
        if measured.is_empty() {
            0.0
        } else {
            measured.iter().sum::<f64>() / measured.len() as f64
        }
    }

    /// Switch shape and rebuild. Returns `true` if the type changed.
    pub fn apply_type(&mut self, topology_type: TopologyType) -> bool {
        let changed = self.topology_type != topology_type;
        self.topology_type = topology_type;
        self.rebuild_connections();
        changed
    }

    /// Recompute the connection set for the current shape.
    pub fn rebuild_connections(&mut self) {
        let ids: Vec<AgentId> = self.nodes.keys().cloned().collect();
        let edges = match self.topology_type {
            TopologyType::Mesh => mesh_edges(&ids),
            TopologyType::Ring => ring_edges(&ids, self.replication_factor),
            TopologyType::Star => star_edges(&ids, self.hubs(1).first()),
            TopologyType::Hierarchical => {
                let hubs = self.hubs(hub_count(ids.len()));
                hierarchical_edges(&ids, &hubs, self.replication_factor)
            }
            TopologyType::Hybrid => {
                let hubs = self.hubs(hub_count(ids.len()));
                let mut edges = ring_edges(&ids, self.replication_factor);
                edges.extend(hierarchical_edges(&ids, &hubs, 1));
                edges
            }
        };

        let mut previous = std::mem::take(&mut self.connections);
        for (from, to) in edges {
            let key = (from, to);
            let connection = previous
                .remove(&key)
                .unwrap_or_else(|| Connection::new(key.0.clone(), key.1.clone()));
            self.connections.insert(key, connection);
        }
        debug!(
            topology = ?self.topology_type,
            nodes = self.nodes.len(),
            connections = self.connections.len(),
            "connections rebuilt"
        );
    }

    /// Coordinators first, then the highest-capacity agents, up to `count`.
    fn hubs(&self, count: usize) -> Vec<AgentId> {
        let mut coordinators: Vec<&AgentNode> = self
            .nodes
            .values()
            .filter(|n| n.role == AgentRole::Coordinator)
            .collect();
        if coordinators.is_empty() {
            let mut ranked: Vec<&AgentNode> = self.nodes.values().collect();
            ranked.sort_by(|a, b| {
                b.capacity
                    .total()
                    .total_cmp(&a.capacity.total())
                    .then_with(|| a.agent_id.cmp(&b.agent_id))
            });
            ranked.truncate(count);
            coordinators = ranked;
        }
        coordinators.into_iter().map(|n| n.agent_id.clone()).collect()
    }
}

/// Roughly one hub per five agents, at least one.
fn hub_count(nodes: usize) -> usize {
    nodes.div_ceil(5).max(1)
}

fn mesh_edges(ids: &[AgentId]) -> BTreeSet<(AgentId, AgentId)> {
    let mut edges = BTreeSet::new();
    for from in ids {
        for to in ids {
            if from != to {
                edges.insert((from.clone(), to.clone()));
            }
        }
    }
    edges
}

/// Each agent links both ways to its next `replication_factor - 1`
/// successors (at least one).
fn ring_edges(ids: &[AgentId], replication_factor: usize) -> BTreeSet<(AgentId, AgentId)> {
    let mut edges = BTreeSet::new();
    let n = ids.len();
    if n < 2 {
        return edges;
    }
    let span = replication_factor.saturating_sub(1).clamp(1, n - 1);
    for (i, from) in ids.iter().enumerate() {
        for step in 1..=span {
            let to = &ids[(i + step) % n];
            edges.insert((from.clone(), to.clone()));
            edges.insert((to.clone(), from.clone()));
        }
    }
    edges
}

fn star_edges(ids: &[AgentId], hub: Option<&AgentId>) -> BTreeSet<(AgentId, AgentId)> {
    let mut edges = BTreeSet::new();
    if let Some(hub) = hub {
        for id in ids.iter().filter(|id| *id != hub) {
            edges.insert((hub.clone(), id.clone()));
            edges.insert((id.clone(), hub.clone()));
        }
    }
    edges
}

/// Hubs form a full mesh; every other agent attaches to up to
/// `replication_factor` hubs, rotating so load spreads evenly.
fn hierarchical_edges(
    ids: &[AgentId],
    hubs: &[AgentId],
    replication_factor: usize,
) -> BTreeSet<(AgentId, AgentId)> {
    let mut edges = mesh_edges(hubs);
    if hubs.is_empty() {
        return edges;
    }
    let per_leaf = replication_factor.clamp(1, hubs.len());
    let leaves = ids.iter().filter(|id| !hubs.contains(id));
    for (i, leaf) in leaves.enumerate() {
        for j in 0..per_leaf {
            let hub = &hubs[(i + j) % hubs.len()];
            edges.insert((leaf.clone(), hub.clone()));
            edges.insert((hub.clone(), leaf.clone()));
        }
    }
    edges
}
