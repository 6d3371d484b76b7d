//! Deterministic resolution of concurrent writes.
//!
//! Given an existing entry and an incoming operation whose clocks compare as
//! concurrent, every replica picks the same outcome:
//!
//! 1. `merge` operations combine through the value kind's combine function
//!    (counter max, set union) when both sides declare one.
//! 2. Everything else is last-writer-wins on `(timestamp, source_agent)`,
//!    with the value hash as a final tiebreak so identical keys still order.
//!
//! Resolution is pure; recording outcomes is a separate step so callers can
//! resolve under a read lock and record in bulk afterwards.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use hive_core::constants::MAX_CONFLICT_HISTORY;
use hive_core::errors::ConflictError;
use hive_core::models::AgentId;

use crate::memory::{MemoryEntry, MemoryOperation, MemoryValue, OperationKind};

/// What to do with a concurrent pair.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The stored entry wins; the incoming operation only contributes its clock.
    KeepExisting,
    /// The incoming operation replaces the stored value.
    TakeIncoming,
    /// Both values were combined.
    Merged(MemoryValue),
}

impl Resolution {
    pub fn kind(&self) -> ResolutionKind {
        match self {
            Resolution::KeepExisting => ResolutionKind::KeptExisting,
            Resolution::TakeIncoming => ResolutionKind::TookIncoming,
            Resolution::Merged(_) => ResolutionKind::Merged,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
    KeptExisting,
    TookIncoming,
    Merged,
}

/// A resolved conflict, as fed back into the resolver's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedConflict {
    pub key: String,
    pub kind: ResolutionKind,
    /// Agent whose write now owns the key.
    pub winner: AgentId,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverStats {
    pub kept_existing: u64,
    pub took_incoming: u64,
    pub merged: u64,
    /// Operations dropped because their values could not be combined.
    pub failed: u64,
}

impl ResolverStats {
    pub fn total_resolved(&self) -> u64 {
        self.kept_existing + self.took_incoming + self.merged
    }
}

/// Deterministic conflict resolver with a bounded history of outcomes.
#[derive(Debug, Default)]
pub struct ConflictResolver {
    history: VecDeque<ResolvedConflict>,
    stats: ResolverStats,
}

impl ConflictResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a concurrent pair. Never touches the network or local state.
    pub fn resolve(
        &self,
        existing: &MemoryEntry,
        incoming: &MemoryOperation,
    ) -> Result<Resolution, ConflictError> {
        if let OperationKind::Merge { value } = &incoming.kind {
            if let Some(current) = &existing.value {
                match (current.is_mergeable(), value.is_mergeable()) {
                    (true, true) => {
                        return current.combine(value).map(Resolution::Merged).ok_or_else(|| {
                            incompatible(&incoming.key, current, value)
                        });
                    }
                    (false, false) => {}
                    _ => return Err(incompatible(&incoming.key, current, value)),
                }
            }
        }
        Ok(last_writer_wins(existing, incoming))
    }

    /// Feed resolved conflicts back into the history and counters.
    pub fn record(&mut self, conflicts: impl IntoIterator<Item = ResolvedConflict>) {
        for conflict in conflicts {
            match conflict.kind {
                ResolutionKind::KeptExisting => self.stats.kept_existing += 1,
                ResolutionKind::TookIncoming => self.stats.took_incoming += 1,
                ResolutionKind::Merged => self.stats.merged += 1,
            }
            debug!(key = %conflict.key, kind = ?conflict.kind, winner = %conflict.winner, "conflict resolved");
            if self.history.len() == MAX_CONFLICT_HISTORY {
                self.history.pop_front();
            }
            self.history.push_back(conflict);
        }
    }

    /// Count an operation dropped by a resolution error.
    pub fn record_failure(&mut self) {
        self.stats.failed += 1;
    }

    pub fn stats(&self) -> ResolverStats {
        self.stats
    }

    /// Most recent resolutions, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &ResolvedConflict> {
        self.history.iter()
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.stats = ResolverStats::default();
    }
}

/// Higher `(timestamp, source_agent)` wins; equal keys fall back to the
/// lexicographically greater value hash.
pub fn incoming_wins_lww(existing: &MemoryEntry, incoming: &MemoryOperation) -> bool {
    let incoming_key = incoming.lww_key();
    let existing_key = existing.lww_key();
    if incoming_key != existing_key {
        incoming_key > existing_key
    } else {
        incoming.value_hash() > existing.value_hash()
    }
}

fn last_writer_wins(existing: &MemoryEntry, incoming: &MemoryOperation) -> Resolution {
    if incoming_wins_lww(existing, incoming) {
        Resolution::TakeIncoming
    } else {
        Resolution::KeepExisting
    }
}

fn incompatible(key: &str, existing: &MemoryValue, incoming: &MemoryValue) -> ConflictError {
    ConflictError::IncompatibleMerge {
        key: key.to_string(),
        existing: existing.kind_name().to_string(),
        incoming: incoming.kind_name().to_string(),
    }
}
