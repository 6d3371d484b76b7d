/// Membership errors raised by topology mutations.
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("agent already present in topology: {0}")]
    DuplicateAgent(String),

    #[error("agent not found in topology: {0}")]
    UnknownAgent(String),
}
