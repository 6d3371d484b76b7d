//! Vector clock for causal ordering.
//!
//! Each agent maintains its own logical clock entry. Used by delta sync
//! to decide whether an incoming operation supersedes, precedes, or races
//! with the local entry.
//!
//! # Examples
//!
//! ```
//! use hive_crdt::{CausalOrder, VectorClock};
//!
//! let mut a = VectorClock::new();
//! a.increment("agent-1");
//! a.increment("agent-1");
//!
//! let mut b = VectorClock::new();
//! b.increment("agent-2");
//!
//! assert_eq!(a.compare(&b), CausalOrder::Concurrent);
//!
//! a.merge(&b);
//! assert_eq!(a.get("agent-1"), 2);
//! assert_eq!(a.get("agent-2"), 1);
//! assert_eq!(a.to_string(), "agent-1:2,agent-2:1");
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use hive_core::errors::{HiveError, HiveResult};

/// Outcome of comparing two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CausalOrder {
    /// Every counter ≤ the other's, at least one strictly less.
    Before,
    /// The mirror of `Before`.
    After,
    Equal,
    /// Neither clock dominates.
    Concurrent,
}

impl CausalOrder {
    /// The ordering seen from the other clock's side.
    pub fn reverse(self) -> Self {
        match self {
            CausalOrder::Before => CausalOrder::After,
            CausalOrder::After => CausalOrder::Before,
            other => other,
        }
    }
}

/// A vector clock mapping agent IDs to logical timestamps.
///
/// Entries are kept sorted so the wire encoding is stable and usable as a
/// dedup key. Absent agents read as 0 and zero counters are never stored,
/// which keeps structural equality and causal equality the same thing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "ClockRepr")]
pub struct VectorClock {
    /// Agent ID → logical clock value.
    clocks: BTreeMap<String, u64>,
}

/// Wire shape of [`VectorClock`]; zero counters are dropped on the way in.
#[derive(Deserialize)]
struct ClockRepr {
    #[serde(default)]
    clocks: BTreeMap<String, u64>,
}

impl From<ClockRepr> for VectorClock {
    fn from(repr: ClockRepr) -> Self {
        let mut clocks = repr.clocks;
        clocks.retain(|_, count| *count > 0);
        Self { clocks }
    }
}

impl VectorClock {
    /// Create an empty vector clock.
    pub fn new() -> Self {
        Self {
            clocks: BTreeMap::new(),
        }
    }

    /// Increment the clock entry for the given agent by 1, returning the new value.
    pub fn increment(&mut self, agent_id: &str) -> u64 {
        let entry = self.clocks.entry(agent_id.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Get the current clock value for an agent (0 if absent).
    pub fn get(&self, agent_id: &str) -> u64 {
        self.clocks.get(agent_id).copied().unwrap_or(0)
    }

    /// Merge with another clock: component-wise max.
    ///
    /// Satisfies commutativity, associativity, and idempotency.
    pub fn merge(&mut self, other: &Self) {
        for (agent_id, &other_val) in &other.clocks {
            let entry = self.clocks.entry(agent_id.clone()).or_insert(0);
            *entry = (*entry).max(other_val);
        }
    }

    /// A copy with `agent_id`'s counter one lower, dropped at zero. Dominated
    /// by `self` unless the counter was already zero.
    pub fn decremented(&self, agent_id: &str) -> Self {
        let mut out = self.clone();
        if let Some(count) = out.clocks.get_mut(agent_id) {
            *count -= 1;
            if *count == 0 {
                out.clocks.remove(agent_id);
            }
        }
        out
    }

    /// Component-wise max of two clocks without mutating either.
    pub fn merged(&self, other: &Self) -> Self {
        let mut out = self.clone();
        out.merge(other);
        out
    }

    /// Compare `self` against `other`.
    pub fn compare(&self, other: &Self) -> CausalOrder {
        let mut less = false;
        let mut greater = false;

        for (agent_id, &self_val) in &self.clocks {
            let other_val = other.get(agent_id);
            if self_val < other_val {
                less = true;
            } else if self_val > other_val {
                greater = true;
            }
        }
        // Entries only `other` has are > our implicit 0.
        for (agent_id, &other_val) in &other.clocks {
            if !self.clocks.contains_key(agent_id) && other_val > 0 {
                less = true;
            }
        }

        match (less, greater) {
            (false, false) => CausalOrder::Equal,
            (true, false) => CausalOrder::Before,
            (false, true) => CausalOrder::After,
            (true, true) => CausalOrder::Concurrent,
        }
    }

    /// Returns true if `self` happens-before `other`.
    pub fn happens_before(&self, other: &Self) -> bool {
        self.compare(other) == CausalOrder::Before
    }

    /// Returns true if neither clock happens-before the other.
    pub fn concurrent_with(&self, other: &Self) -> bool {
        self.compare(other) == CausalOrder::Concurrent
    }

    /// Returns true if `self` strictly dominates `other`.
    pub fn dominates(&self, other: &Self) -> bool {
        self.compare(other) == CausalOrder::After
    }

    /// Returns true if everything `self` records is also recorded by `other`.
    pub fn covered_by(&self, other: &Self) -> bool {
        matches!(self.compare(other), CausalOrder::Before | CausalOrder::Equal)
    }

    /// Returns all agent IDs present in this clock, in sorted order.
    pub fn agents(&self) -> Vec<&str> {
        self.clocks.keys().map(|s| s.as_str()).collect()
    }

    /// Sum of all counters. Useful as a coarse progress measure.
    pub fn total(&self) -> u64 {
        self.clocks.values().sum()
    }

    /// Returns the number of agents tracked by this clock.
    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    /// Returns true if the clock has no entries.
    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }

    /// Stable wire encoding: `agent:count` pairs sorted by agent, comma-separated.
    pub fn to_stable_string(&self) -> String {
        self.clocks
            .iter()
            .map(|(agent, count)| format!("{agent}:{count}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parse the encoding produced by [`VectorClock::to_stable_string`].
    pub fn parse(input: &str) -> HiveResult<Self> {
        let mut clocks = BTreeMap::new();
        for pair in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (agent, count) = pair.rsplit_once(':').ok_or_else(|| HiveError::ClockParse {
                input: input.to_string(),
            })?;
            let count: u64 = count.parse().map_err(|_| HiveError::ClockParse {
                input: input.to_string(),
            })?;
            if agent.is_empty() {
                return Err(HiveError::ClockParse {
                    input: input.to_string(),
                });
            }
            if count > 0 {
                let entry = clocks.entry(agent.to_string()).or_insert(0);
                *entry = (*entry).max(count);
            }
        }
        Ok(Self { clocks })
    }
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_stable_string())
    }
}

impl FromStr for VectorClock {
    type Err = HiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
