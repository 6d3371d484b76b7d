//! DependencyBuffer: holds deltas that arrived before the deltas they
//! depend on.
//!
//! Releasing one delta can unblock others, so draining iterates until a
//! pass releases nothing. A delta held longer than the configured wait is
//! released regardless; its operations are clock-guarded on application,
//! so late or out-of-order release cannot regress an entry.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use hive_crdt::{MemoryDelta, MemoryOperation, VectorClock};

/// A verified delta waiting on its dependencies.
#[derive(Debug, Clone)]
pub struct HeldDelta {
    pub delta: Arc<MemoryDelta>,
    /// Already opened and integrity-checked.
    pub operations: Vec<MemoryOperation>,
    pub version: VectorClock,
    /// Whether to re-propagate once applied.
    pub disseminate: bool,
    pub held_at: Instant,
}

impl HeldDelta {
    pub fn delta_id(&self) -> &str {
        &self.delta.delta_id
    }
}

#[derive(Debug)]
pub struct DependencyBuffer {
    held: VecDeque<HeldDelta>,
    capacity: usize,
}

impl DependencyBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            held: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Hold a delta. When full, the oldest held delta is evicted and returned.
    /// A delta that is already held is ignored.
    pub fn hold(&mut self, delta: HeldDelta) -> Option<HeldDelta> {
        if self.contains(delta.delta_id()) {
            return None;
        }
        let evicted = if self.held.len() >= self.capacity {
            self.held.pop_front()
        } else {
            None
        };
        debug!(delta_id = %delta.delta_id(), deps = delta.delta.dependencies.len(), "holding delta for dependencies");
        self.held.push_back(delta);
        evicted
    }

    pub fn contains(&self, delta_id: &str) -> bool {
        self.held.iter().any(|h| h.delta_id() == delta_id)
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    pub fn clear(&mut self) {
        self.held.clear();
    }

    /// Release every delta whose dependencies are applied (or released in
    /// this same drain), plus any held for at least `max_wait`.
    ///
    /// Returned in release order: a delta always follows the held deltas it
    /// depends on.
    pub fn drain_ready(
        &mut self,
        is_applied: impl Fn(&str) -> bool,
        now: Instant,
        max_wait: Duration,
    ) -> Vec<HeldDelta> {
        let mut released: Vec<HeldDelta> = Vec::new();
        let mut released_ids: HashSet<String> = HashSet::new();
        let mut changed = true;

        while changed {
            changed = false;
            let mut remaining = VecDeque::new();
            for held in std::mem::take(&mut self.held) {
                let ready = held
                    .delta
                    .dependencies
                    .iter()
                    .all(|dep| is_applied(dep) || released_ids.contains(dep));
                let expired = now.saturating_duration_since(held.held_at) >= max_wait;
                if ready || expired {
                    released_ids.insert(held.delta_id().to_string());
                    released.push(held);
                    changed = true;
                } else {
                    remaining.push_back(held);
                }
            }
            self.held = remaining;
        }

        if !released.is_empty() {
            debug!(
                count = released.len(),
                remaining = self.held.len(),
                "released held deltas"
            );
        }
        released
    }
}
