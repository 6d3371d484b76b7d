//! Operations carried inside deltas.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hive_core::models::AgentId;

use super::entry::{EntryMetadata, MemoryEntry};
use super::value::MemoryValue;
use crate::clock::VectorClock;

/// What an operation does to its key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OperationKind {
    Set { value: MemoryValue },
    Delete,
    /// Combine into the existing value using the value kind's combine function.
    Merge { value: MemoryValue },
}

impl OperationKind {
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Set { .. } => "set",
            OperationKind::Delete => "delete",
            OperationKind::Merge { .. } => "merge",
        }
    }

    /// The value this operation writes; `None` for deletes.
    pub fn value(&self) -> Option<&MemoryValue> {
        match self {
            OperationKind::Set { value } | OperationKind::Merge { value } => Some(value),
            OperationKind::Delete => None,
        }
    }
}

/// A single replicated mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryOperation {
    pub key: String,
    pub kind: OperationKind,
    /// Clock of the write this operation describes.
    pub clock: VectorClock,
    pub timestamp: DateTime<Utc>,
    pub metadata: EntryMetadata,
}

impl MemoryOperation {
    /// Describe the current state of an entry as the operation that recreates it.
    ///
    /// Tombstones become deletes, mergeable values become merges so the
    /// receiver combines instead of overwriting.
    pub fn from_entry(entry: &MemoryEntry) -> Self {
        let kind = match &entry.value {
            None => OperationKind::Delete,
            Some(value) if value.is_mergeable() => OperationKind::Merge {
                value: value.clone(),
            },
            Some(value) => OperationKind::Set {
                value: value.clone(),
            },
        };
        Self {
            key: entry.key.clone(),
            kind,
            clock: entry.clock.clone(),
            timestamp: entry.timestamp,
            metadata: entry.metadata.clone(),
        }
    }

    pub fn source_agent(&self) -> &AgentId {
        &self.metadata.source_agent
    }

    /// `(timestamp, source_agent)`: the total order used by last-writer-wins.
    pub fn lww_key(&self) -> (DateTime<Utc>, &str) {
        (self.timestamp, self.metadata.source_agent.as_str())
    }

    /// Tiebreak hash over the written value; deletes hash the empty input.
    pub fn value_hash(&self) -> String {
        match self.kind.value() {
            Some(value) => value.content_hash(),
            None => blake3::hash(b"").to_hex().to_string(),
        }
    }

    /// blake3 over the canonical JSON encoding. Merkle leaf.
    pub fn content_hash(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }

    /// The entry this operation produces when nothing exists for its key.
    pub fn into_entry(self) -> MemoryEntry {
        let value = match self.kind {
            OperationKind::Set { value } | OperationKind::Merge { value } => Some(value),
            OperationKind::Delete => None,
        };
        MemoryEntry {
            key: self.key,
            value,
            clock: self.clock,
            metadata: self.metadata,
            timestamp: self.timestamp,
        }
    }
}
