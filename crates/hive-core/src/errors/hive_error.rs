use super::{ConflictError, IntegrityError, TopologyError, TransportError};

/// Top-level error type for the hive memory layer.
/// All subsystem errors convert into this via `From` impls.
#[derive(Debug, thiserror::Error)]
pub enum HiveError {
    #[error("integrity check failed: {0}")]
    IntegrityError(#[from] IntegrityError),

    #[error("conflict resolution failed: {0}")]
    ConflictError(#[from] ConflictError),

    #[error("transport error: {0}")]
    TransportError(#[from] TransportError),

    #[error("topology error: {0}")]
    TopologyError(#[from] TopologyError),

    #[error("invalid quorum threshold {threshold}: must be in (0, 1]")]
    InvalidQuorumThreshold { threshold: f64 },

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("invalid vector clock encoding: {input}")]
    ClockParse { input: String },

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("manager is shut down")]
    ShutDown,
}

/// Convenience type alias.
pub type HiveResult<T> = Result<T, HiveError>;
