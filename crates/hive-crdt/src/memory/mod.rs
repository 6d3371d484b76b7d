//! Replicated store elements and the delta format that carries them.

pub mod delta;
pub mod entry;
pub mod merkle;
pub mod operation;
pub mod value;

pub use delta::MemoryDelta;
pub use entry::{EntryMetadata, MemoryEntry};
pub use merkle::{checksum, merkle_root};
pub use operation::{MemoryOperation, OperationKind};
pub use value::MemoryValue;
