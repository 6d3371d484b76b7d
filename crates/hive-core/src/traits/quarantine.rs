use crate::models::AgentId;

/// Trust-layer hook consulted before a peer's gossip is admitted.
pub trait QuarantineOracle: Send + Sync {
    fn is_agent_quarantined(&self, agent_id: &AgentId) -> bool;
}

/// Admits every agent. Used when no trust layer is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoQuarantine;

impl QuarantineOracle for NoQuarantine {
    fn is_agent_quarantined(&self, _agent_id: &AgentId) -> bool {
        false
    }
}
