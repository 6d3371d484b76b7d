pub mod agent;
pub mod priority;
pub mod topology;

pub use agent::{AgentId, AgentRole, ShardId};
pub use priority::Priority;
pub use topology::{ConsistencyLevel, PartitionStrategy, TopologyType};
