//! Event bus for gossip notifications.
//!
//! Pub/sub over a Tokio broadcast channel. Publishing with no subscribers
//! is not an error; slow subscribers observe `Lagged` and skip ahead.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use hive_core::models::AgentId;
use hive_crdt::{MemoryDelta, VectorClock};

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GossipEventKind {
    UpdateReceived,
    SyncRequested,
    SyncResponseReceived,
    AgentDiscovered,
    NodeFailed,
    NodeRecovered,
    NodeLeft,
}

impl GossipEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GossipEventKind::UpdateReceived => "update_received",
            GossipEventKind::SyncRequested => "sync_requested",
            GossipEventKind::SyncResponseReceived => "sync_response_received",
            GossipEventKind::AgentDiscovered => "agent_discovered",
            GossipEventKind::NodeFailed => "node_failed",
            GossipEventKind::NodeRecovered => "node_recovered",
            GossipEventKind::NodeLeft => "node_left",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GossipEvent {
    UpdateReceived {
        from: AgentId,
        message_id: String,
        delta: Arc<MemoryDelta>,
        vector_clock: VectorClock,
        /// Addressed to this agent rather than relayed epidemically.
        direct: bool,
    },
    SyncRequested {
        from: AgentId,
        version: VectorClock,
    },
    SyncResponseReceived {
        from: AgentId,
        delta: Option<Arc<MemoryDelta>>,
        version: VectorClock,
    },
    AgentDiscovered {
        agent_id: AgentId,
        address: String,
        capabilities: Vec<String>,
    },
    NodeFailed {
        agent_id: AgentId,
        reliability: f64,
    },
    NodeRecovered {
        agent_id: AgentId,
    },
    NodeLeft {
        agent_id: AgentId,
    },
}

impl GossipEvent {
    pub fn kind(&self) -> GossipEventKind {
        match self {
            GossipEvent::UpdateReceived { .. } => GossipEventKind::UpdateReceived,
            GossipEvent::SyncRequested { .. } => GossipEventKind::SyncRequested,
            GossipEvent::SyncResponseReceived { .. } => GossipEventKind::SyncResponseReceived,
            GossipEvent::AgentDiscovered { .. } => GossipEventKind::AgentDiscovered,
            GossipEvent::NodeFailed { .. } => GossipEventKind::NodeFailed,
            GossipEvent::NodeRecovered { .. } => GossipEventKind::NodeRecovered,
            GossipEvent::NodeLeft { .. } => GossipEventKind::NodeLeft,
        }
    }

    /// Agent the event is about.
    pub fn agent_id(&self) -> &AgentId {
        match self {
            GossipEvent::UpdateReceived { from, .. }
            | GossipEvent::SyncRequested { from, .. }
            | GossipEvent::SyncResponseReceived { from, .. } => from,
            GossipEvent::AgentDiscovered { agent_id, .. }
            | GossipEvent::NodeFailed { agent_id, .. }
            | GossipEvent::NodeRecovered { agent_id }
            | GossipEvent::NodeLeft { agent_id } => agent_id,
        }
    }
}

#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<GossipEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish to all subscribers. Returns how many received it.
    pub fn publish(&self, event: GossipEvent) -> usize {
        let kind = event.kind().as_str();
        match self.sender.send(event) {
            Ok(count) => {
                debug!(event = kind, receivers = count, "event published");
                count
            }
            Err(_) => {
                debug!(event = kind, "event published (no receivers)");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GossipEvent> {
        self.sender.subscribe()
    }

    /// Subscribe to a subset of event kinds.
    pub fn subscribe_kinds(&self, kinds: &[GossipEventKind]) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), kinds.to_vec())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver that only yields events of the requested kinds.
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<GossipEvent>,
    kinds: Vec<GossipEventKind>,
}

impl FilteredReceiver {
    pub fn new(receiver: broadcast::Receiver<GossipEvent>, kinds: Vec<GossipEventKind>) -> Self {
        Self { receiver, kinds }
    }

    pub fn matches(&self, event: &GossipEvent) -> bool {
        self.kinds.contains(&event.kind())
    }

    /// Receive the next matching event.
    pub async fn recv(&mut self) -> Result<GossipEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Next matching event already in the channel, without waiting.
    pub fn try_recv(&mut self) -> Result<GossipEvent, broadcast::error::TryRecvError> {
        loop {
            let event = self.receiver.try_recv()?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }
}
