//! Property-based tests for clock algebra and resolver determinism.
//!
//! Clock merge MUST satisfy:
//! 1. Commutativity: merge(A, B) == merge(B, A)
//! 2. Associativity: merge(A, merge(B, C)) == merge(merge(A, B), C)
//! 3. Idempotency: merge(A, A) == A
//!
//! Comparison MUST be antisymmetric: compare(A, B) == compare(B, A).reverse().

use proptest::prelude::*;

use chrono::{TimeZone, Utc};
use hive_core::models::AgentId;
use hive_crdt::{
    CausalOrder, ConflictResolver, EntryMetadata, MemoryEntry, MemoryOperation, MemoryValue,
    OperationKind, Resolution, VectorClock,
};

// =============================================================================
// Strategy helpers
// =============================================================================

/// Generate a random VectorClock.
fn vector_clock_strategy(max_agents: usize, max_val: u64) -> impl Strategy<Value = VectorClock> {
    prop::collection::vec(
        (
            "[a-e]{1,2}".prop_map(|s| format!("agent-{s}")),
            1..=max_val,
        ),
        0..=max_agents,
    )
    .prop_map(|entries| {
        let mut clock = VectorClock::new();
        for (agent, count) in entries {
            for _ in 0..count {
                clock.increment(&agent);
            }
        }
        clock
    })
}

fn write_strategy() -> impl Strategy<Value = (String, i64, i64)> {
    ("[a-c]".prop_map(|s| format!("agent-{s}")), 0..5i64, 0..100i64)
}

fn as_entry((agent, secs, v): &(String, i64, i64)) -> MemoryEntry {
    let mut clock = VectorClock::new();
    clock.increment(agent);
    MemoryEntry {
        key: "k".into(),
        value: Some(MemoryValue::Opaque(serde_json::json!(v))),
        clock,
        metadata: EntryMetadata::new(AgentId::from(agent.as_str())),
        timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
    }
}

fn as_op(write: &(String, i64, i64)) -> MemoryOperation {
    MemoryOperation::from_entry(&as_entry(write))
}

/// Value that ends up stored after resolving `incoming` against `existing`.
fn winner(existing: &MemoryEntry, incoming: &MemoryOperation) -> Option<MemoryValue> {
    match ConflictResolver::new().resolve(existing, incoming).unwrap() {
        Resolution::KeepExisting => existing.value.clone(),
        Resolution::TakeIncoming => incoming.kind.value().cloned(),
        Resolution::Merged(v) => Some(v),
    }
}

proptest! {
    #[test]
    fn merge_is_commutative(a in vector_clock_strategy(5, 10), b in vector_clock_strategy(5, 10)) {
        prop_assert_eq!(a.merged(&b), b.merged(&a));
    }

    #[test]
    fn merge_is_associative(
        a in vector_clock_strategy(5, 10),
        b in vector_clock_strategy(5, 10),
        c in vector_clock_strategy(5, 10),
    ) {
        prop_assert_eq!(a.merged(&b.merged(&c)), a.merged(&b).merged(&c));
    }

    #[test]
    fn merge_is_idempotent(a in vector_clock_strategy(5, 10)) {
        prop_assert_eq!(a.merged(&a), a.clone());
    }

    #[test]
    fn compare_is_antisymmetric(a in vector_clock_strategy(5, 5), b in vector_clock_strategy(5, 5)) {
        prop_assert_eq!(a.compare(&b), b.compare(&a).reverse());
    }

    #[test]
    fn merged_clock_covers_both_inputs(a in vector_clock_strategy(5, 10), b in vector_clock_strategy(5, 10)) {
        let m = a.merged(&b);
        prop_assert!(a.covered_by(&m));
        prop_assert!(b.covered_by(&m));
    }

    #[test]
    fn stable_string_round_trips(a in vector_clock_strategy(5, 10)) {
        prop_assert_eq!(VectorClock::parse(&a.to_stable_string()).unwrap(), a);
    }

    #[test]
    fn equal_only_when_identical(a in vector_clock_strategy(4, 3), b in vector_clock_strategy(4, 3)) {
        prop_assert_eq!(a.compare(&b) == CausalOrder::Equal, a == b);
    }

    #[test]
    fn lww_resolution_is_order_independent(x in write_strategy(), y in write_strategy()) {
        prop_assume!(x.0 != y.0);
        // Replica holding x receives y, and replica holding y receives x.
        let on_x = winner(&as_entry(&x), &as_op(&y));
        let on_y = winner(&as_entry(&y), &as_op(&x));
        prop_assert_eq!(on_x, on_y);
    }

    #[test]
    fn counter_merge_is_order_independent(a in 0..1000u64, b in 0..1000u64) {
        let mut left = as_entry(&("agent-a".into(), 0, 0));
        left.value = Some(MemoryValue::Counter(a));
        let mut right = as_entry(&("agent-b".into(), 0, 0));
        right.value = Some(MemoryValue::Counter(b));
        let into_left = winner(&left, &MemoryOperation::from_entry(&right));
        let into_right = winner(&right, &MemoryOperation::from_entry(&left));
        prop_assert_eq!(into_left.clone(), into_right);
        prop_assert_eq!(into_left, Some(MemoryValue::Counter(a.max(b))));
    }
}

#[test]
fn merge_kind_round_trips_through_from_entry() {
    let mut entry = as_entry(&("agent-a".into(), 0, 0));
    entry.value = Some(MemoryValue::Counter(3));
    assert!(matches!(
        MemoryOperation::from_entry(&entry).kind,
        OperationKind::Merge { .. }
    ));
}
