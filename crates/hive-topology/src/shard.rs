//! Sharding collaborator boundary.

use hive_core::models::ShardId;

use crate::node::AgentNode;

/// External shard manager notified on membership change.
pub trait ShardCoordinator: Send + Sync {
    /// The node set changed shape; rebalance across all of `nodes`.
    fn rebalance_shards(&self, nodes: &[AgentNode]);

    /// `shard_ids` lost their owner; move them onto `remaining_nodes`.
    fn redistribute_shards(&self, shard_ids: &[ShardId], remaining_nodes: &[AgentNode]);
}

/// Coordinator that does nothing. Used when sharding is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopShardCoordinator;

impl ShardCoordinator for NoopShardCoordinator {
    fn rebalance_shards(&self, _nodes: &[AgentNode]) {}

    fn redistribute_shards(&self, _shard_ids: &[ShardId], _remaining_nodes: &[AgentNode]) {}
}
