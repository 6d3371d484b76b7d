use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;

use hive_core::config::GossipConfig;
use hive_core::models::{AgentId, Priority};
use hive_core::traits::{QuarantineOracle, Transport};
use hive_crdt::{MemoryDelta, VectorClock};
use hive_gossip::{
    GossipEvent, GossipEventKind, GossipMessage, GossipPayload, GossipProtocol, MessageType, Received, Rumor,
};
use test_fixtures::{address_of, FailingTransport, IdentityCompressor, LoopbackNetwork, RecordingTransport};

fn protocol(id: &str, transport: Arc<dyn Transport>, config: GossipConfig) -> GossipProtocol {
    GossipProtocol::new(
        AgentId::from(id),
        address_of(id),
        config,
        Arc::new(RwLock::new(VectorClock::new())),
        transport,
    )
}

fn add_peers(protocol: &GossipProtocol, n: usize) -> Vec<AgentId> {
    (0..n)
        .map(|i| {
            let id = AgentId(format!("peer-{i}"));
            protocol.add_peer(&id, &address_of(id.as_str()), &[]);
            id
        })
        .collect()
}

fn empty_delta(source: &str) -> Arc<MemoryDelta> {
    Arc::new(
        MemoryDelta::seal(
            AgentId::from(source),
            vec![],
            &VectorClock::new(),
            &[],
            vec![],
            &IdentityCompressor,
        )
        .unwrap(),
    )
}

fn update_from(source: &str, ttl: u32) -> GossipMessage {
    GossipMessage::originate(
        AgentId::from(source),
        None,
        VectorClock::new(),
        GossipPayload::Update {
            delta: empty_delta(source),
        },
        ttl,
        Priority::Medium,
    )
}

fn heartbeat_from(source: &str) -> GossipMessage {
    GossipMessage::originate(
        AgentId::from(source),
        None,
        VectorClock::new(),
        GossipPayload::Heartbeat {
            address: address_of(source),
            capabilities: vec!["search".into()],
        },
        1,
        Priority::Low,
    )
}

fn decoded(transport: &RecordingTransport) -> Vec<(String, GossipMessage)> {
    transport
        .sent()
        .into_iter()
        .map(|(address, frame)| (address, GossipMessage::decode(&frame).unwrap()))
        .collect()
}

// --- Quorum ---

#[test]
fn quorum_of_ten_nodes_is_six() {
    let gossip = protocol("local", RecordingTransport::new(), GossipConfig::default());
    let peers = add_peers(&gossip, 10);
    assert_eq!(gossip.min_quorum(), 6);

    // Silence everyone, then bring peers back one at a time.
    let later = Utc::now() + chrono::Duration::minutes(10);
    gossip.detect_failures_at(later);
    assert_eq!(gossip.peers().active_count(), 0);

    for id in &peers[..5] {
        gossip.peers().mark_alive(id, later);
    }
    assert!(!gossip.has_quorum());

    gossip.peers().mark_alive(&peers[5], later);
    assert!(gossip.has_quorum());
}

#[test]
fn invalid_quorum_threshold_is_rejected_without_change() {
    let gossip = protocol("local", RecordingTransport::new(), GossipConfig::default());
    add_peers(&gossip, 10);

    assert!(gossip.set_quorum_threshold(0.0).is_err());
    assert!(gossip.set_quorum_threshold(1.01).is_err());
    assert_eq!(gossip.quorum_threshold(), 0.51);

    gossip.set_quorum_threshold(1.0).unwrap();
    assert_eq!(gossip.min_quorum(), 10);
}

#[test]
fn lone_agent_has_quorum() {
    let gossip = protocol("local", RecordingTransport::new(), GossipConfig::default());
    assert_eq!(gossip.min_quorum(), 0);
    assert!(gossip.has_quorum());
}

// --- Target selection ---

#[test]
fn fanout_scales_with_priority() {
    let gossip = protocol("local", RecordingTransport::new(), GossipConfig::default());
    assert_eq!(gossip.effective_fanout(Priority::Critical, 0), 6);
    assert_eq!(gossip.effective_fanout(Priority::High, 0), 5);
    assert_eq!(gossip.effective_fanout(Priority::Medium, 0), 3);
    assert_eq!(gossip.effective_fanout(Priority::Low, 0), 2);
}

#[test]
fn backlog_halves_low_and_medium_fanout() {
    let gossip = protocol("local", RecordingTransport::new(), GossipConfig::default());
    assert_eq!(gossip.effective_fanout(Priority::Medium, 21), 1);
    assert_eq!(gossip.effective_fanout(Priority::Low, 21), 1);
    assert_eq!(gossip.effective_fanout(Priority::High, 21), 5);
    assert_eq!(gossip.effective_fanout(Priority::Medium, 20), 3);

    let steady = GossipConfig {
        adaptive_gossip: false,
        ..GossipConfig::default()
    };
    let gossip = protocol("local", RecordingTransport::new(), steady);
    assert_eq!(gossip.effective_fanout(Priority::Medium, 500), 3);
}

#[test]
fn targets_skip_the_path_and_are_capped_by_active_peers() {
    let gossip = protocol("local", RecordingTransport::new(), GossipConfig::default());
    add_peers(&gossip, 3);

    let msg = update_from("peer-0", 5);
    let targets = gossip.select_targets(&msg, 0);
    let ids: Vec<&str> = targets.iter().map(|p| p.agent_id.as_str()).collect();
    assert_eq!(ids, ["peer-1", "peer-2"]);

    let mut critical = update_from("elsewhere", 5);
    critical.priority = Priority::Critical;
    assert_eq!(gossip.select_targets(&critical, 0).len(), 3);
}

#[test]
fn fanout_is_limited_to_neighbors() {
    let gossip = protocol("local", RecordingTransport::new(), GossipConfig::default());
    let peers = add_peers(&gossip, 5);
    let mut critical = update_from("elsewhere", 5);
    critical.priority = Priority::Critical;

    gossip.set_neighbors([peers[1].clone(), peers[3].clone()]);
    assert!(gossip.is_neighbor(&peers[3]));
    assert!(!gossip.is_neighbor(&peers[0]));
    let targets = gossip.select_targets(&critical, 0);
    let ids: Vec<&str> = targets.iter().map(|p| p.agent_id.as_str()).collect();
    assert_eq!(ids, ["peer-1", "peer-3"]);

    gossip.set_neighbors(Vec::new());
    assert!(gossip.is_neighbor(&peers[0]));
    assert_eq!(gossip.select_targets(&critical, 0).len(), 5);
}

// --- Rounds ---

#[tokio::test]
async fn round_sends_batch_and_heartbeats() {
    let transport = RecordingTransport::new();
    let gossip = protocol("local", transport.clone(), GossipConfig::default());
    add_peers(&gossip, 5);

    gossip
        .broadcast(GossipPayload::Update { delta: empty_delta("local") }, Priority::Medium)
        .unwrap();
    assert_eq!(gossip.pending_len(), 1);

    gossip.run_round().await;

    let frames = decoded(&transport);
    let updates = frames.iter().filter(|(_, m)| m.message_type() == MessageType::Update).count();
    let heartbeats = frames
        .iter()
        .filter(|(_, m)| m.message_type() == MessageType::Heartbeat)
        .count();
    assert_eq!(updates, 3);
    assert_eq!(heartbeats, 5);
    assert_eq!(gossip.pending_len(), 0);
    assert_eq!(gossip.metrics().gossip.snapshot().rounds, 1);
    assert_eq!(gossip.metrics().gossip.snapshot().messages_sent, 8);
}

#[tokio::test]
async fn batch_size_bounds_each_round() {
    let transport = RecordingTransport::new();
    let config = GossipConfig {
        batch_size: 2,
        ..GossipConfig::default()
    };
    let gossip = protocol("local", transport.clone(), config);
    add_peers(&gossip, 1);
    for _ in 0..5 {
        gossip
            .broadcast(GossipPayload::Update { delta: empty_delta("local") }, Priority::High)
            .unwrap();
    }

    gossip.run_round().await;
    assert_eq!(gossip.pending_len(), 3);
}

// --- Receipt ---

#[test]
fn duplicates_are_dropped() {
    let gossip = protocol("local", RecordingTransport::new(), GossipConfig::default());
    add_peers(&gossip, 2);
    let msg = update_from("peer-0", 3);

    assert_eq!(gossip.receive(msg.clone()), Received::Accepted(MessageType::Update));
    assert_eq!(gossip.receive(msg), Received::Duplicate);
    assert_eq!(gossip.metrics().gossip.snapshot().duplicates, 1);
}

#[test]
fn received_update_is_published_and_continued() {
    let gossip = protocol("local", RecordingTransport::new(), GossipConfig::default());
    add_peers(&gossip, 3);
    let mut updates = gossip.subscribe_kinds(&[GossipEventKind::UpdateReceived]);

    let msg = update_from("peer-0", 3);
    gossip.receive(msg.clone());

    match updates.try_recv().unwrap() {
        GossipEvent::UpdateReceived { from, message_id, direct, .. } => {
            assert_eq!(from, AgentId::from("peer-0"));
            assert_eq!(message_id, msg.message_id);
            assert!(!direct);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(gossip.pending_len(), 1);
}

#[test]
fn last_hop_is_not_continued() {
    let gossip = protocol("local", RecordingTransport::new(), GossipConfig::default());
    add_peers(&gossip, 3);
    gossip.receive(update_from("peer-0", 1));
    assert_eq!(gossip.pending_len(), 0);

    let mut visited = update_from("peer-1", 5);
    visited.path.push(AgentId::from("local"));
    visited.path.push(AgentId::from("peer-2"));
    gossip.receive(visited);
    assert_eq!(gossip.pending_len(), 0);
}

#[tokio::test]
async fn continuation_never_returns_to_the_path() {
    let transport = RecordingTransport::new();
    let gossip = protocol("local", transport.clone(), GossipConfig::default());
    add_peers(&gossip, 5);
    let msg = update_from("peer-0", 3);
    gossip.receive(msg.clone());

    gossip.run_round().await;

    let forwarded: Vec<(String, GossipMessage)> = decoded(&transport)
        .into_iter()
        .filter(|(_, m)| m.message_id == msg.message_id)
        .collect();
    assert_eq!(forwarded.len(), 3);
    for (address, copy) in &forwarded {
        assert_ne!(address, &address_of("peer-0"));
        assert_eq!(copy.ttl, 2);
        assert_eq!(copy.path, vec![AgentId::from("peer-0"), AgentId::from("local")]);
    }
}

#[test]
fn own_messages_are_ignored() {
    let gossip = protocol("local", RecordingTransport::new(), GossipConfig::default());
    assert_eq!(gossip.receive(update_from("local", 4)), Received::Own);
}

#[test]
fn heartbeat_from_unknown_agent_discovers_it() {
    let gossip = protocol("local", RecordingTransport::new(), GossipConfig::default());
    let mut discovered = gossip.subscribe_kinds(&[GossipEventKind::AgentDiscovered]);

    gossip.receive(heartbeat_from("newcomer"));

    let peer = gossip.peers().get(&AgentId::from("newcomer")).unwrap();
    assert_eq!(peer.address, address_of("newcomer"));
    assert_eq!(peer.capabilities, vec!["search".to_string()]);
    match discovered.try_recv().unwrap() {
        GossipEvent::AgentDiscovered { agent_id, .. } => assert_eq!(agent_id.as_str(), "newcomer"),
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn farewell_rumor_removes_the_peer() {
    let gossip = protocol("local", RecordingTransport::new(), GossipConfig::default());
    add_peers(&gossip, 3);
    let mut left = gossip.subscribe_kinds(&[GossipEventKind::NodeLeft]);

    let farewell = GossipMessage::originate(
        AgentId::from("peer-1"),
        None,
        VectorClock::new(),
        GossipPayload::Rumor(Rumor::NodeLeaving {
            agent_id: AgentId::from("peer-1"),
        }),
        4,
        Priority::Critical,
    );
    gossip.receive(farewell);

    assert!(!gossip.peers().contains(&AgentId::from("peer-1")));
    assert_eq!(left.try_recv().unwrap().agent_id(), &AgentId::from("peer-1"));
    // The rumor keeps travelling to everyone else.
    assert_eq!(gossip.pending_len(), 1);
}

struct Blocklist(Vec<AgentId>);

impl QuarantineOracle for Blocklist {
    fn is_agent_quarantined(&self, agent_id: &AgentId) -> bool {
        self.0.contains(agent_id)
    }
}

#[test]
fn quarantined_agents_are_not_admitted() {
    let gossip = protocol("local", RecordingTransport::new(), GossipConfig::default())
        .with_quarantine(Arc::new(Blocklist(vec![AgentId::from("mallory")])));
    let mut events = gossip.subscribe();

    assert_eq!(gossip.receive(update_from("mallory", 3)), Received::Quarantined);

    // Relayed through an honest peer is still refused.
    let mut relayed = update_from("peer-0", 3);
    relayed.path.push(AgentId::from("mallory"));
    assert_eq!(gossip.receive(relayed), Received::Quarantined);

    assert!(events.try_recv().is_err());
    assert_eq!(gossip.pending_len(), 0);
}

#[test]
fn garbage_frames_are_rejected() {
    let gossip = protocol("local", RecordingTransport::new(), GossipConfig::default());
    assert_eq!(gossip.receive_frame(b"not json"), Received::Rejected);
    assert_eq!(gossip.metrics().gossip.snapshot().dropped, 1);
}

// --- Failure detection ---

#[test]
fn three_missed_windows_mark_a_peer_inactive() {
    let gossip = protocol("local", RecordingTransport::new(), GossipConfig::default());
    let peers = add_peers(&gossip, 1);
    let mut failures = gossip.subscribe_kinds(&[GossipEventKind::NodeFailed]);
    let t0 = Utc::now();
    let before = gossip.peers().get(&peers[0]).unwrap().reliability;

    // Default window: 1000ms interval x 3.
    assert!(gossip
        .detect_failures_at(t0 + chrono::Duration::milliseconds(6_100))
        .is_empty());
    assert!(gossip.peers().get(&peers[0]).unwrap().is_active());

    let failed = gossip.detect_failures_at(t0 + chrono::Duration::milliseconds(9_100));
    assert_eq!(failed, peers);

    let peer = gossip.peers().get(&peers[0]).unwrap();
    assert!(!peer.is_active());
    assert!(peer.reliability < before);
    match failures.try_recv().unwrap() {
        GossipEvent::NodeFailed { agent_id, reliability } => {
            assert_eq!(agent_id, peers[0]);
            assert_eq!(reliability, peer.reliability);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(gossip.metrics().gossip.snapshot().nodes_failed, 1);
}

#[test]
fn any_message_revives_an_inactive_peer() {
    let gossip = protocol("local", RecordingTransport::new(), GossipConfig::default());
    add_peers(&gossip, 1);
    let mut recovered = gossip.subscribe_kinds(&[GossipEventKind::NodeRecovered]);
    gossip.detect_failures_at(Utc::now() + chrono::Duration::minutes(1));

    gossip.receive(heartbeat_from("peer-0"));

    let peer = gossip.peers().get(&AgentId::from("peer-0")).unwrap();
    assert!(peer.is_active());
    assert_eq!(peer.failure_count, 0);
    assert_eq!(recovered.try_recv().unwrap().agent_id(), &AgentId::from("peer-0"));
}

#[tokio::test]
async fn send_failures_degrade_but_do_not_deactivate() {
    let gossip = protocol("local", Arc::new(FailingTransport), GossipConfig::default());
    let peers = add_peers(&gossip, 3);

    gossip.run_round().await;

    for id in &peers {
        let peer = gossip.peers().get(id).unwrap();
        assert!(peer.is_active());
        assert_eq!(peer.failure_count, 1);
        assert!((peer.reliability - 0.7).abs() < 1e-9);
    }
    assert_eq!(gossip.metrics().gossip.snapshot().send_failures, 3);

    // Failures accumulate across rounds until the threshold is reached.
    gossip.run_round().await;
    gossip.run_round().await;
    assert_eq!(gossip.peers().active_count(), 0);
}

// --- Flood control ---

#[test]
fn full_queue_sheds_oldest_non_critical() {
    let config = GossipConfig {
        max_pending_messages: 4,
        ..GossipConfig::default()
    };
    let gossip = protocol("local", RecordingTransport::new(), config);
    for _ in 0..5 {
        gossip
            .broadcast(GossipPayload::Update { delta: empty_delta("local") }, Priority::Low)
            .unwrap();
    }
    assert_eq!(gossip.pending_len(), 4);
    assert_eq!(gossip.metrics().gossip.snapshot().dropped, 1);
}

#[test]
fn critical_messages_are_never_shed() {
    let config = GossipConfig {
        max_pending_messages: 2,
        ..GossipConfig::default()
    };
    let gossip = protocol("local", RecordingTransport::new(), config);
    let update = || GossipPayload::Update { delta: empty_delta("local") };
    gossip.broadcast(update(), Priority::Critical).unwrap();
    gossip.broadcast(update(), Priority::Critical).unwrap();

    gossip.broadcast(update(), Priority::Low).unwrap();
    assert_eq!(gossip.pending_len(), 2);

    gossip.broadcast(update(), Priority::Critical).unwrap();
    assert_eq!(gossip.pending_len(), 3);
}

// --- Anti-entropy ---

#[tokio::test]
async fn anti_entropy_asks_the_stalest_peers() {
    let transport = RecordingTransport::new();
    let gossip = protocol("local", transport.clone(), GossipConfig::default());
    let peers = add_peers(&gossip, 5);
    let now = Utc::now();
    for (i, id) in peers.iter().enumerate() {
        gossip
            .peers()
            .mark_alive(id, now + chrono::Duration::seconds(10 - i as i64));
    }

    let sent = gossip.run_anti_entropy().await;

    assert_eq!(sent, 3);
    let mut addresses: Vec<String> = decoded(&transport)
        .into_iter()
        .map(|(address, msg)| {
            assert_eq!(msg.message_type(), MessageType::SyncRequest);
            assert!(msg.is_direct());
            address
        })
        .collect();
    addresses.sort();
    assert_eq!(addresses, [address_of("peer-2"), address_of("peer-3"), address_of("peer-4")]);
}

// --- Lifecycle ---

#[tokio::test]
async fn shutdown_says_goodbye_and_releases_peers() {
    let transport = RecordingTransport::new();
    let gossip = protocol("local", transport.clone(), GossipConfig::default());
    add_peers(&gossip, 3);

    gossip.shutdown();
    assert!(gossip.peers().is_empty());
    assert!(gossip
        .broadcast(GossipPayload::Update { delta: empty_delta("local") }, Priority::Low)
        .is_err());

    tokio::time::sleep(Duration::from_millis(20)).await;
    let farewells = decoded(&transport);
    assert_eq!(farewells.len(), 3);
    assert!(farewells
        .iter()
        .all(|(_, m)| m.payload
            == GossipPayload::Rumor(Rumor::NodeLeaving {
                agent_id: AgentId::from("local")
            })));
}

#[tokio::test]
async fn heartbeats_travel_over_the_loopback_network() {
    let network = LoopbackNetwork::new();
    let _a_inbox = network.register(&address_of("a"));
    let mut b_inbox = network.register(&address_of("b"));
    let a = protocol("a", network.clone(), GossipConfig::default());
    let b = protocol("b", network.clone(), GossipConfig::default());
    a.add_peer(&AgentId::from("b"), &address_of("b"), &[]);

    a.run_round().await;

    let frame = b_inbox.recv().await.unwrap();
    assert_eq!(b.receive_frame(&frame), Received::Accepted(MessageType::Heartbeat));
    assert!(b.peers().contains(&AgentId::from("a")));
}

#[tokio::test(start_paused = true)]
async fn started_loops_run_until_shutdown() {
    let transport = RecordingTransport::new();
    let gossip = Arc::new(protocol("local", transport.clone(), GossipConfig::default()));
    add_peers(&gossip, 2);

    gossip.start();
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    let rounds = gossip.metrics().gossip.snapshot().rounds;
    assert!(rounds >= 2, "rounds = {rounds}");

    gossip.shutdown();
    tokio::time::sleep(Duration::from_millis(5_000)).await;
    assert_eq!(gossip.metrics().gossip.snapshot().rounds, rounds);
}
