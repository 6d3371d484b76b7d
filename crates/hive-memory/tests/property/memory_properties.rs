use proptest::prelude::*;
use serde_json::json;

use hive_core::models::AgentId;
use hive_crdt::{MemoryDelta, MemoryValue, VectorClock};
use hive_memory::{DistributedMemoryManager, ManagerBuilder};
use test_fixtures::{address_of, fast_config, RecordingTransport};

const AGENTS: [&str; 3] = ["a", "b", "c"];
const ORDERS: [[usize; 3]; 6] = [
    [0, 1, 2],
    [0, 2, 1],
    [1, 0, 2],
    [1, 2, 0],
    [2, 0, 1],
    [2, 1, 0],
];

#[derive(Debug, Clone)]
enum Write {
    Opaque(usize, i64),
    Counter(usize, u64),
    Delete(usize),
}

fn write_strategy() -> impl Strategy<Value = (usize, Write)> {
    let write = prop_oneof![
        (0usize..3, -50i64..50).prop_map(|(k, v)| Write::Opaque(k, v)),
        (0usize..3, 0u64..100).prop_map(|(k, v)| Write::Counter(k, v)),
        (0usize..3).prop_map(Write::Delete),
    ];
    (0..AGENTS.len(), write)
}

fn replica(id: &str) -> DistributedMemoryManager {
    ManagerBuilder::new(id, address_of(id), RecordingTransport::new())
        .config(fast_config())
        .build()
        .unwrap()
}

/// Run the writes on three agents and return each agent's full delta.
fn deltas_for(writes: &[(usize, Write)]) -> Vec<MemoryDelta> {
    let agents: Vec<DistributedMemoryManager> = AGENTS.iter().map(|id| replica(id)).collect();
    for (agent, write) in writes {
        let agent = &agents[*agent];
        match write {
            Write::Opaque(k, v) => {
                agent.set(format!("o{k}"), json!(v)).unwrap();
            }
            Write::Counter(k, v) => {
                agent.merge(format!("c{k}"), MemoryValue::Counter(*v)).unwrap();
            }
            Write::Delete(k) => {
                agent.delete(&format!("o{k}")).unwrap();
            }
        }
    }
    agents
        .iter()
        .filter_map(|agent| {
            agent
                .create_delta_sync(&AgentId::from("observer"), &VectorClock::new())
                .unwrap()
        })
        .collect()
}

fn state(replica: &DistributedMemoryManager) -> Vec<(String, Option<MemoryValue>, VectorClock)> {
    (0..3)
        .flat_map(|k| [format!("o{k}"), format!("c{k}")])
        .filter_map(|key| replica.entry(&key).map(|e| (key, e.value, e.clock)))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn apply_order_does_not_matter(
        writes in prop::collection::vec(write_strategy(), 1..24),
        order in 0..ORDERS.len(),
    ) {
        let deltas = deltas_for(&writes);

        let in_order = replica("observer");
        for delta in &deltas {
            prop_assert!(in_order.apply_delta(delta));
        }
        let shuffled = replica("observer");
        for i in ORDERS[order] {
            if let Some(delta) = deltas.get(i) {
                prop_assert!(shuffled.apply_delta(delta));
            }
        }

        prop_assert_eq!(state(&in_order), state(&shuffled));
        prop_assert_eq!(in_order.clock(), shuffled.clock());
    }

    #[test]
    fn applying_twice_is_idempotent(writes in prop::collection::vec(write_strategy(), 1..24)) {
        let deltas = deltas_for(&writes);
        let observer = replica("observer");
        for delta in &deltas {
            observer.apply_delta(delta);
        }
        let once = state(&observer);
        let clock = observer.clock();

        for delta in deltas.iter().rev() {
            observer.apply_delta(delta);
        }
        prop_assert_eq!(state(&observer), once);
        prop_assert_eq!(observer.clock(), clock);
    }
}
