//! Deterministic shard placement.
//!
//! All strategies are pure functions of the shard set and the agent set so
//! every replica computes the same owner without coordination.

use std::collections::BTreeMap;

use hive_core::models::{AgentId, PartitionStrategy, ShardId};

#[derive(Debug, Clone)]
pub struct PartitionPlanner {
    strategy: PartitionStrategy,
    virtual_nodes: usize,
}

impl PartitionPlanner {
    pub fn new(strategy: PartitionStrategy, virtual_nodes: usize) -> Self {
        Self {
            strategy,
            virtual_nodes: virtual_nodes.max(1),
        }
    }

    pub fn strategy(&self) -> PartitionStrategy {
        self.strategy
    }

    /// Assign every shard to one agent. Empty `agents` yields an empty plan.
    pub fn assign(&self, shards: &[ShardId], agents: &[AgentId]) -> BTreeMap<ShardId, AgentId> {
        let mut agents: Vec<&AgentId> = agents.iter().collect();
        agents.sort();
        agents.dedup();
        if agents.is_empty() {
            return BTreeMap::new();
        }
        match self.strategy {
            PartitionStrategy::Hash => shards
                .iter()
                .map(|s| {
                    let idx = (hash64(s.0.as_bytes()) % agents.len() as u64) as usize;
                    (s.clone(), agents[idx].clone())
                })
                .collect(),
            PartitionStrategy::Range => {
                let mut sorted: Vec<&ShardId> = shards.iter().collect();
                sorted.sort();
                sorted.dedup();
                let total = sorted.len();
                sorted
                    .into_iter()
                    .enumerate()
                    .map(|(i, s)| (s.clone(), agents[i * agents.len() / total].clone()))
                    .collect()
            }
            PartitionStrategy::ConsistentHash => {
                let ring = self.ring(&agents);
                shards
                    .iter()
                    .map(|s| (s.clone(), ring_owner(&ring, hash64(s.0.as_bytes())).clone()))
                    .collect()
            }
        }
    }

    fn ring<'a>(&self, agents: &[&'a AgentId]) -> Vec<(u64, &'a AgentId)> {
        let mut ring: Vec<(u64, &AgentId)> = agents
            .iter()
            .flat_map(|agent| {
                (0..self.virtual_nodes)
                    .map(move |v| (hash64(format!("{}#{v}", agent.0).as_bytes()), *agent))
            })
            .collect();
        ring.sort();
        ring
    }
}

fn ring_owner<'a>(ring: &[(u64, &'a AgentId)], point: u64) -> &'a AgentId {
    let idx = ring.partition_point(|(h, _)| *h < point);
    ring[idx % ring.len()].1
}

fn hash64(bytes: &[u8]) -> u64 {
    let digest = blake3::hash(bytes);
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_be_bytes(head)
}
