//! Agent vertices.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hive_core::models::{AgentId, AgentRole, ShardId};
use hive_crdt::VectorClock;

/// Resources an agent advertises. Units are relative; only ordering matters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceCapacity {
    pub memory: f64,
    pub cpu: f64,
    pub network: f64,
}

impl ResourceCapacity {
    pub fn total(&self) -> f64 {
        self.memory + self.cpu + self.network
    }
}

impl Default for ResourceCapacity {
    fn default() -> Self {
        Self {
            memory: 1.0,
            cpu: 1.0,
            network: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentNode {
    pub agent_id: AgentId,
    pub address: String,
    pub role: AgentRole,
    pub capacity: ResourceCapacity,
    pub capabilities: BTreeSet<String>,
    /// In [0, 1].
    pub trust_level: f64,
    pub last_seen: DateTime<Utc>,
    /// Latest clock observed from this agent.
    pub clock: VectorClock,
    pub shards: BTreeSet<ShardId>,
}

impl AgentNode {
    pub fn new(agent_id: impl Into<AgentId>, address: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            address: address.into(),
            role: AgentRole::default(),
            capacity: ResourceCapacity::default(),
            capabilities: BTreeSet::new(),
            trust_level: 0.5,
            last_seen: Utc::now(),
            clock: VectorClock::new(),
            shards: BTreeSet::new(),
        }
    }

    pub fn with_role(mut self, role: AgentRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// Trust is clamped into [0, 1].
    pub fn with_trust(mut self, trust_level: f64) -> Self {
        self.trust_level = trust_level.clamp(0.0, 1.0);
        self
    }

    pub fn with_capacity(mut self, capacity: ResourceCapacity) -> Self {
        self.capacity = capacity;
        self
    }

    /// Record contact at `now` and fold in the clock the agent reported.
    pub fn touch(&mut self, now: DateTime<Utc>, clock: Option<&VectorClock>) {
        if now > self.last_seen {
            self.last_seen = now;
        }
        if let Some(clock) = clock {
            self.clock.merge(clock);
        }
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}
