/// Transient network errors reported by the transport collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("send to {target} timed out after {timeout_ms}ms")]
    Timeout { target: String, timeout_ms: u64 },

    #[error("peer {target} unreachable: {reason}")]
    Unreachable { target: String, reason: String },

    #[error("transport closed")]
    Closed,
}
