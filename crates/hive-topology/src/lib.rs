//! # hive-topology
//!
//! Membership and shape of the agent swarm.
//!
//! - [`AgentNode`] / [`Connection`]: vertices and directed edges
//! - [`MemoryTopology`]: the graph plus replication and partition settings
//! - [`TopologyOptimizer`]: picks a connection shape from swarm characteristics
//! - [`PartitionPlanner`]: deterministic shard placement (hash, range, consistent hash)
//! - [`TopologyManager`]: ties the above together and notifies the [`ShardCoordinator`]

pub mod connection;
pub mod manager;
pub mod node;
pub mod optimizer;
pub mod partition;
pub mod shard;
pub mod topology;

pub use connection::Connection;
pub use manager::TopologyManager;
pub use node::{AgentNode, ResourceCapacity};
pub use optimizer::{OptimizationOutcome, SwarmProfile, TopologyOptimizer};
pub use partition::PartitionPlanner;
pub use shard::{NoopShardCoordinator, ShardCoordinator};
pub use topology::MemoryTopology;
