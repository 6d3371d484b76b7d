//! Values held by memory entries.
//!
//! Opaque JSON values carry no combine function and resolve by
//! last-writer-wins. Counters and sets declare an associative, commutative,
//! idempotent combine (max and union respectively).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MemoryValue {
    Opaque(serde_json::Value),
    /// Monotonic counter. Combines by max.
    Counter(u64),
    /// Grow-only collection. Combines by union.
    Set(BTreeSet<String>),
}

impl MemoryValue {
    /// Short name used in logs and error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            MemoryValue::Opaque(_) => "opaque",
            MemoryValue::Counter(_) => "counter",
            MemoryValue::Set(_) => "set",
        }
    }

    /// Whether this value declares a combine function.
    pub fn is_mergeable(&self) -> bool {
        !matches!(self, MemoryValue::Opaque(_))
    }

    /// Combine two values of the same mergeable kind.
    ///
    /// Returns `None` when the kinds differ or neither declares a combine.
    pub fn combine(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (MemoryValue::Counter(a), MemoryValue::Counter(b)) => {
                Some(MemoryValue::Counter(*a.max(b)))
            }
            (MemoryValue::Set(a), MemoryValue::Set(b)) => {
                Some(MemoryValue::Set(a.union(b).cloned().collect()))
            }
            _ => None,
        }
    }

    /// blake3 over the canonical JSON form. Used as the last-resort tiebreak.
    pub fn content_hash(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }
}

impl From<serde_json::Value> for MemoryValue {
    fn from(value: serde_json::Value) -> Self {
        MemoryValue::Opaque(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_combine_by_max() {
        let a = MemoryValue::Counter(3);
        let b = MemoryValue::Counter(7);
        assert_eq!(a.combine(&b), Some(MemoryValue::Counter(7)));
        assert_eq!(b.combine(&a), Some(MemoryValue::Counter(7)));
    }

    #[test]
    fn sets_combine_by_union() {
        let a = MemoryValue::Set(["x".to_string()].into());
        let b = MemoryValue::Set(["y".to_string()].into());
        let merged = a.combine(&b).unwrap();
        assert_eq!(merged, MemoryValue::Set(["x".to_string(), "y".to_string()].into()));
    }

    #[test]
    fn mismatched_kinds_do_not_combine() {
        let a = MemoryValue::Counter(1);
        let b = MemoryValue::Set(BTreeSet::new());
        assert!(a.combine(&b).is_none());
        assert!(MemoryValue::Opaque(serde_json::json!(1))
            .combine(&MemoryValue::Opaque(serde_json::json!(2)))
            .is_none());
    }
}
