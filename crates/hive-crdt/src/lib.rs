//! # hive-crdt
//!
//! Causality and convergence primitives for replicated agent memory.
//!
//! - [`VectorClock`]: per-replica counters with happens-before / concurrent detection
//! - [`MemoryValue`]: opaque values plus mergeable kinds (max counter, union set)
//! - [`MemoryEntry`] / [`MemoryOperation`]: store elements and the operations that change them
//! - [`MemoryDelta`]: sealed, checksummed, Merkle-rooted batch of operations
//! - [`ConflictResolver`]: deterministic resolution of concurrent writes
//!
//! ## Guarantees
//!
//! 1. `merge` on clocks is commutative, associative, and idempotent.
//! 2. Resolution of a concurrent pair depends only on the pair, so every
//!    replica that sees the same two inputs picks the same winner.

pub mod clock;
pub mod memory;
pub mod resolver;

// Re-export public API
pub use clock::{CausalOrder, VectorClock};
pub use memory::{
    checksum, merkle_root, EntryMetadata, MemoryDelta, MemoryEntry, MemoryOperation, MemoryValue,
    OperationKind,
};
pub use resolver::{
    incoming_wins_lww, ConflictResolver, Resolution, ResolutionKind, ResolvedConflict, ResolverStats,
};
