//! # hive-gossip
//!
//! Epidemic propagation of memory deltas between agents.
//!
//! - [`GossipMessage`]: immutable wire message with TTL and visited path
//! - [`PeerTable`]: per-peer liveness, reliability, and round-trip state
//! - [`EventBus`]: broadcast channel consumed by the memory manager and
//!   the trust layer
//! - [`GossipProtocol`]: rounds, heartbeats, failure detection,
//!   anti-entropy, and quorum

pub mod events;
pub mod message;
pub mod peer;
pub mod protocol;

pub use events::{EventBus, FilteredReceiver, GossipEvent, GossipEventKind};
pub use message::{GossipMessage, GossipPayload, MessageType, Rumor};
pub use peer::{PeerState, PeerStatus, PeerTable};
pub use protocol::{GossipProtocol, Received};
