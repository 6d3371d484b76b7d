//! # hive-core
//!
//! Foundation crate for the hive replicated-memory layer.
//! Defines identities, shared enums, config, errors, constants, and the
//! traits external collaborators implement (transport, compression,
//! quarantine). Every other crate in the workspace depends on this.

pub mod config;
pub mod constants;
pub mod errors;
pub mod models;
pub mod traits;

// Re-export the most commonly used types at the crate root.
pub use config::HiveConfig;
pub use errors::{HiveError, HiveResult};
pub use models::{AgentId, AgentRole, ConsistencyLevel, PartitionStrategy, Priority, ShardId, TopologyType};
