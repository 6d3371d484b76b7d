use serde::{Deserialize, Serialize};

/// Connection shape between agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TopologyType {
    #[default]
    Mesh,
    Hierarchical,
    Ring,
    Star,
    Hybrid,
}

/// How keys and shards are assigned to nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStrategy {
    Hash,
    Range,
    #[default]
    ConsistentHash,
}

/// Consistency requirement advertised to the topology optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyLevel {
    #[default]
    Eventual,
    Strong,
    BoundedStaleness,
}
