use async_trait::async_trait;

use crate::errors::TransportError;

/// Outbound network collaborator. Delivers a serialized frame to a peer.
///
/// Delivery is never assumed reliable: callers treat any error as a
/// transient failure of the target. Implementations own their own
/// per-send timeout.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, target_address: &str, frame: Vec<u8>) -> Result<(), TransportError>;
}
