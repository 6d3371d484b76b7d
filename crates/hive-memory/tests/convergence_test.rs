//! Managers running their full task set over the in-process network.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use hive_core::models::AgentId;
use hive_crdt::MemoryValue;
use hive_memory::{ContextUpdate, DistributedMemoryManager, ManagerBuilder, PropagationOptions};
use test_fixtures::{address_of, fast_config, node, node_with, LoopbackNetwork};

fn swarm(network: &Arc<LoopbackNetwork>, ids: &[&str]) -> Vec<Arc<DistributedMemoryManager>> {
    ids.iter()
        .map(|id| {
            let inbox = network.register(&address_of(id));
            let manager = Arc::new(
                ManagerBuilder::new(*id, address_of(id), network.endpoint(&address_of(id)))
                    .config(fast_config())
                    .build()
                    .unwrap(),
            );
            manager.listen(inbox);
            manager
        })
        .collect()
}

async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..150 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

fn holds(manager: &DistributedMemoryManager, key: &str, value: serde_json::Value) -> bool {
    manager.get(key) == Some(MemoryValue::Opaque(value))
}

fn introduce_all(agents: &[Arc<DistributedMemoryManager>], ids: &[&str]) {
    for agent in agents {
        for id in ids.iter().filter(|id| **id != agent.agent_id().as_str()) {
            agent.add_agent(node(id)).unwrap();
        }
    }
}

#[tokio::test]
async fn writes_reach_every_agent() {
    let network = LoopbackNetwork::new();
    let agents = swarm(&network, &["a", "b", "c"]);
    // Only "a" is seeded; the others learn of each other from heartbeats.
    agents[0].add_agent(node("b")).unwrap();
    agents[0].add_agent(node("c")).unwrap();
    for agent in &agents {
        agent.start();
    }

    agents[0].set("k", json!("from-a")).unwrap();
    assert!(eventually(|| agents.iter().all(|m| holds(m, "k", json!("from-a")))).await);

    assert!(eventually(|| agents[2].topology().contains(&AgentId::from("a"))).await);
    agents[2].set("k2", json!(2)).unwrap();
    assert!(eventually(|| agents.iter().all(|m| holds(m, "k2", json!(2)))).await);

    for agent in &agents {
        agent.shutdown();
    }
}

#[tokio::test]
async fn partitioned_agent_catches_up_after_healing() {
    let network = LoopbackNetwork::new();
    let ids = ["a", "b", "c"];
    let agents = swarm(&network, &ids);
    introduce_all(&agents, &ids);
    network.partition(&address_of("c"));
    for agent in &agents {
        agent.start();
    }

    agents[0].set("k", json!(1)).unwrap();
    assert!(eventually(|| holds(&agents[1], "k", json!(1))).await);
    assert!(agents[2].get("k").is_none());

    network.heal(&address_of("c"));
    assert!(eventually(|| holds(&agents[2], "k", json!(1))).await);
    assert!(agents[0].metrics().sync.failed_syncs > 0);

    for agent in &agents {
        agent.shutdown();
    }
}

#[tokio::test]
async fn relayed_writes_do_not_hide_earlier_ones() {
    let network = LoopbackNetwork::new();
    let ids = ["a", "b", "c"];
    let agents = swarm(&network, &ids);
    introduce_all(&agents, &ids);
    let (a, b, c) = (&agents[0], &agents[1], &agents[2]);
    network.cut(&address_of("a"), &address_of("c"));
    network.cut(&address_of("b"), &address_of("c"));
    for agent in &agents {
        agent.start();
    }

    a.set("k1", json!(1)).unwrap();
    assert!(eventually(|| holds(b, "k1", json!(1))).await);

    // From here on c hears about a's writes only through b.
    network.mend(&address_of("b"), &address_of("c"));
    a.set("k2", json!(2)).unwrap();

    assert!(eventually(|| holds(c, "k1", json!(1)) && holds(c, "k2", json!(2))).await);
    assert!(eventually(|| c.clock() == a.clock()).await);

    for agent in &agents {
        agent.shutdown();
    }
}

#[tokio::test]
async fn context_send_does_not_hide_earlier_writes() {
    let network = LoopbackNetwork::new();
    let ids = ["a", "b", "c"];
    let agents = swarm(&network, &ids);
    introduce_all(&agents[1..], &ids);
    agents[0].add_agent(node("b")).unwrap();
    agents[0].add_agent(node_with("c", &["rust"], 0.9)).unwrap();
    let (a, c) = (&agents[0], &agents[2]);
    network.cut(&address_of("a"), &address_of("c"));
    network.cut(&address_of("b"), &address_of("c"));
    for agent in &agents {
        agent.start();
    }

    a.set("k0", json!("earlier")).unwrap();
    assert!(eventually(|| holds(&agents[1], "k0", json!("earlier"))).await);

    network.mend(&address_of("a"), &address_of("c"));
    let update = ContextUpdate::new("ctx", json!({"title": "deploy"})).requiring(["rust"]);
    let report = a.propagate_context(update, PropagationOptions::default()).await.unwrap();
    assert!(report.targets.iter().any(|(id, _)| id.as_str() == "c"));

    assert!(eventually(|| holds(c, "ctx", json!({"title": "deploy"}))).await);
    assert!(eventually(|| holds(c, "k0", json!("earlier"))).await);
    assert!(eventually(|| c.clock() == a.clock()).await);

    for agent in &agents {
        agent.shutdown();
    }
}
