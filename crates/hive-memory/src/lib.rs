//! # hive-memory
//!
//! The replicated key-value store each agent holds, and the manager that
//! keeps it converging with every other agent's.
//!
//! - [`MemoryStore`]: local entries, tombstones included
//! - [`ZstdCompressor`]: the delta payload codec
//! - [`DependencyBuffer`]: deltas held until the deltas they depend on land
//! - [`context`]: relevance scoring and per-target personalization
//! - [`DistributedMemoryManager`]: local writes, delta creation and
//!   application, topology upkeep, and the periodic sync tasks

pub mod buffer;
pub mod codec;
pub mod context;
pub mod manager;
pub mod store;

pub use buffer::{DependencyBuffer, HeldDelta};
pub use codec::ZstdCompressor;
pub use context::{ContextUpdate, PropagationOptions, PropagationReport};
pub use manager::{
    ApplyOutcome, ApplyReport, CleanupReport, DistributedMemoryManager, ManagerBuilder, WriteOptions,
};
pub use store::MemoryStore;
