//! Span definitions per operation: gossip round, delta application,
//! anti-entropy, topology change.

/// Create a gossip round span.
#[macro_export]
macro_rules! gossip_round_span {
    ($agent_id:expr, $pending:expr) => {
        tracing::debug_span!("hive.gossip_round", agent_id = %$agent_id, pending = $pending)
    };
}

/// Create a delta application span.
#[macro_export]
macro_rules! delta_apply_span {
    ($delta_id:expr, $source:expr) => {
        tracing::info_span!("hive.delta_apply", delta_id = %$delta_id, source = %$source)
    };
}

/// Create an anti-entropy span.
#[macro_export]
macro_rules! anti_entropy_span {
    ($agent_id:expr, $peers:expr) => {
        tracing::debug_span!("hive.anti_entropy", agent_id = %$agent_id, peers = $peers)
    };
}

/// Create a topology change span.
#[macro_export]
macro_rules! topology_span {
    ($reason:expr, $nodes:expr) => {
        tracing::info_span!("hive.topology", reason = %$reason, nodes = $nodes)
    };
}

/// Span names as constants for programmatic use.
pub mod names {
    pub const GOSSIP_ROUND: &str = "hive.gossip_round";
    pub const DELTA_APPLY: &str = "hive.delta_apply";
    pub const ANTI_ENTROPY: &str = "hive.anti_entropy";
    pub const TOPOLOGY: &str = "hive.topology";
}
