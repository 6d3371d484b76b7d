use proptest::prelude::*;

use hive_core::models::{AgentId, Priority};
use hive_crdt::VectorClock;
use hive_gossip::{GossipMessage, GossipPayload, Rumor};

fn message(ttl: u32, path: Vec<String>) -> GossipMessage {
    let mut msg = GossipMessage::originate(
        AgentId::from("origin"),
        None,
        VectorClock::new(),
        GossipPayload::Rumor(Rumor::NodeLeaving {
            agent_id: AgentId::from("origin"),
        }),
        ttl,
        Priority::Medium,
    );
    msg.path.extend(path.into_iter().map(AgentId));
    msg
}

proptest! {
    #[test]
    fn continuation_spends_a_hop_and_extends_path(
        ttl in 0u32..12,
        path in prop::collection::vec("[a-f]", 0..5),
        via in "[a-h]",
    ) {
        let msg = message(ttl, path);
        let via = AgentId(via);
        match msg.continuation(&via) {
            Some(next) => {
                prop_assert!(ttl > 1);
                prop_assert!(!msg.has_visited(&via));
                prop_assert_eq!(next.ttl, ttl - 1);
                prop_assert_eq!(next.path.len(), msg.path.len() + 1);
                prop_assert_eq!(next.path.last(), Some(&via));
                prop_assert_eq!(&next.message_id, &msg.message_id);
            }
            None => prop_assert!(ttl <= 1 || msg.has_visited(&via)),
        }
    }

    #[test]
    fn relaying_terminates(ttl in 1u32..12, hops in prop::collection::vec("[a-z]{3}", 0..20)) {
        let mut current = message(ttl, vec![]);
        let mut forwarded = 0u32;
        for hop in hops {
            if let Some(next) = current.continuation(&AgentId(hop)) {
                current = next;
                forwarded += 1;
            }
        }
        prop_assert!(forwarded < ttl);
        prop_assert!(current.ttl >= 1);
    }
}
