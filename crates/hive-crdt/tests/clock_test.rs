use hive_crdt::{CausalOrder, VectorClock};

fn clock(entries: &[(&str, u64)]) -> VectorClock {
    let mut c = VectorClock::new();
    for (agent, count) in entries {
        for _ in 0..*count {
            c.increment(agent);
        }
    }
    c
}

#[test]
fn increment_returns_new_counter() {
    let mut c = VectorClock::new();
    assert_eq!(c.increment("a"), 1);
    assert_eq!(c.increment("a"), 2);
    assert_eq!(c.get("a"), 2);
}

#[test]
fn compare_detects_before_and_after() {
    let older = clock(&[("a", 1)]);
    let newer = clock(&[("a", 2), ("b", 1)]);
    assert_eq!(older.compare(&newer), CausalOrder::Before);
    assert_eq!(newer.compare(&older), CausalOrder::After);
    assert!(older.happens_before(&newer));
    assert!(newer.dominates(&older));
}

#[test]
fn compare_detects_concurrency() {
    let a = clock(&[("a", 1)]);
    let b = clock(&[("b", 1)]);
    assert_eq!(a.compare(&b), CausalOrder::Concurrent);
    assert!(a.concurrent_with(&b));
}

#[test]
fn empty_clocks_are_equal() {
    assert_eq!(VectorClock::new().compare(&VectorClock::new()), CausalOrder::Equal);
}

#[test]
fn empty_clock_precedes_any_write() {
    let written = clock(&[("a", 1)]);
    assert_eq!(VectorClock::new().compare(&written), CausalOrder::Before);
    assert!(VectorClock::new().covered_by(&written));
    assert!(!written.covered_by(&VectorClock::new()));
}

#[test]
fn merge_takes_elementwise_max() {
    let mut a = clock(&[("a", 3), ("b", 1)]);
    let b = clock(&[("a", 1), ("b", 4), ("c", 2)]);
    a.merge(&b);
    assert_eq!(a.get("a"), 3);
    assert_eq!(a.get("b"), 4);
    assert_eq!(a.get("c"), 2);
}

#[test]
fn stable_string_is_sorted_and_parses_back() {
    let c = clock(&[("zeta", 1), ("alpha", 3)]);
    let encoded = c.to_stable_string();
    assert_eq!(encoded, "alpha:3,zeta:1");
    assert_eq!(VectorClock::parse(&encoded).unwrap(), c);
    assert_eq!(encoded.parse::<VectorClock>().unwrap(), c);
}

#[test]
fn stable_string_tolerates_colons_in_agent_ids() {
    let c = clock(&[("agent://a", 2)]);
    assert_eq!(VectorClock::parse(&c.to_string()).unwrap(), c);
}
