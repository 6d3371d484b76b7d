//! Wire messages.
//!
//! A message is never mutated after it is sent. Forwarding builds a
//! continuation: same id, one less hop, and the forwarder appended to the
//! path, so receivers deduplicate every copy of one rumor.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hive_core::errors::HiveResult;
use hive_core::models::{AgentId, Priority};
use hive_crdt::{MemoryDelta, VectorClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Update,
    SyncRequest,
    SyncResponse,
    Heartbeat,
    Rumor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", rename_all = "snake_case")]
pub enum Rumor {
    /// The named agent is shutting down gracefully.
    NodeLeaving { agent_id: AgentId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GossipPayload {
    Update {
        delta: Arc<MemoryDelta>,
    },
    /// `version` is the requester's clock; the responder sends what it lacks.
    SyncRequest {
        version: VectorClock,
    },
    SyncResponse {
        delta: Option<Arc<MemoryDelta>>,
        version: VectorClock,
    },
    /// Liveness advert. Address and capabilities let unknown senders join.
    Heartbeat {
        address: String,
        capabilities: Vec<String>,
    },
    Rumor(Rumor),
}

impl GossipPayload {
    pub fn message_type(&self) -> MessageType {
        match self {
            GossipPayload::Update { .. } => MessageType::Update,
            GossipPayload::SyncRequest { .. } => MessageType::SyncRequest,
            GossipPayload::SyncResponse { .. } => MessageType::SyncResponse,
            GossipPayload::Heartbeat { .. } => MessageType::Heartbeat,
            GossipPayload::Rumor(_) => MessageType::Rumor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GossipMessage {
    pub message_id: String,
    pub source_agent: AgentId,
    /// Set for direct messages, which are never forwarded.
    pub target_agent: Option<AgentId>,
    /// Source's clock when the message was created.
    pub vector_clock: VectorClock,
    pub payload: GossipPayload,
    /// Remaining hops, including the one in flight.
    pub ttl: u32,
    /// Agents that have already held this message, source first.
    pub path: Vec<AgentId>,
    pub priority: Priority,
    pub sent_at: DateTime<Utc>,
}

impl GossipMessage {
    /// A fresh message originated by `source`.
    pub fn originate(
        source: AgentId,
        target: Option<AgentId>,
        vector_clock: VectorClock,
        payload: GossipPayload,
        ttl: u32,
        priority: Priority,
    ) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            path: vec![source.clone()],
            source_agent: source,
            target_agent: target,
            vector_clock,
            payload,
            ttl,
            priority,
            sent_at: Utc::now(),
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }

    pub fn is_direct(&self) -> bool {
        self.target_agent.is_some()
    }

    /// Agent this copy was received from: the last entry in the path.
    pub fn sender(&self) -> &AgentId {
        self.path.last().unwrap_or(&self.source_agent)
    }

    pub fn has_visited(&self, agent_id: &AgentId) -> bool {
        self.path.contains(agent_id)
    }

    /// The copy `via` forwards on, or `None` if this message must stop here.
    ///
    /// Direct messages and heartbeats never travel further; otherwise a
    /// continuation needs `ttl > 1` and an agent not already on the path.
    pub fn continuation(&self, via: &AgentId) -> Option<Self> {
        if self.is_direct()
            || self.message_type() == MessageType::Heartbeat
            || self.ttl <= 1
            || self.has_visited(via)
        {
            return None;
        }
        let mut next = self.clone();
        next.ttl -= 1;
        next.path.push(via.clone());
        Some(next)
    }

    pub fn encode(&self) -> HiveResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(frame: &[u8]) -> HiveResult<Self> {
        Ok(serde_json::from_slice(frame)?)
    }
}
