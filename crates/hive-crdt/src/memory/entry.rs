//! Store element with its owning vector clock snapshot.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use hive_core::models::{AgentId, Priority};

use super::value::MemoryValue;
use crate::clock::VectorClock;

/// Descriptive fields carried alongside every entry and operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub namespace: String,
    /// Seconds after `timestamp` at which the entry stops being readable.
    pub ttl_secs: Option<u64>,
    pub priority: Priority,
    /// Agent that performed the last winning write.
    pub source_agent: AgentId,
}

impl EntryMetadata {
    pub fn new(source_agent: AgentId) -> Self {
        Self {
            namespace: "default".to_string(),
            ttl_secs: None,
            priority: Priority::default(),
            source_agent,
        }
    }
}

/// One key in the replicated store.
///
/// A `None` value is a tombstone: the key was deleted, but its clock is
/// kept so the deletion replicates and orders against concurrent writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub key: String,
    pub value: Option<MemoryValue>,
    /// Causally ≥ the clock of the write that produced `value`.
    pub clock: VectorClock,
    pub metadata: EntryMetadata,
    /// Wall-clock time of the winning write. LWW primary key.
    pub timestamp: DateTime<Utc>,
}

impl MemoryEntry {
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Whether the entry's TTL has elapsed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.metadata.ttl_secs {
            Some(ttl) => {
                let ttl = Duration::seconds(i64::try_from(ttl).unwrap_or(i64::MAX));
                self.timestamp
                    .checked_add_signed(ttl)
                    .is_some_and(|deadline| deadline <= now)
            }
            None => false,
        }
    }

    /// The value as seen by readers: tombstones and expired entries read as absent.
    pub fn visible_value(&self, now: DateTime<Utc>) -> Option<&MemoryValue> {
        if self.is_expired(now) {
            None
        } else {
            self.value.as_ref()
        }
    }

    /// `(timestamp, source_agent)`: the total order used by last-writer-wins.
    pub fn lww_key(&self) -> (DateTime<Utc>, &str) {
        (self.timestamp, self.metadata.source_agent.as_str())
    }

    /// Tiebreak hash over the stored value; tombstones hash the empty input.
    pub fn value_hash(&self) -> String {
        match &self.value {
            Some(value) => value.content_hash(),
            None => blake3::hash(b"").to_hex().to_string(),
        }
    }
}
