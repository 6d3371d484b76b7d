//! Epidemic gossip engine.
//!
//! One [`GossipProtocol`] per agent. It owns the peer table, the pending
//! queue, and the seen-message cache, each guarded on its own. Two periodic
//! tasks drive it:
//!
//! - the round loop drains a batch of pending messages, sends one heartbeat
//!   to every known peer, and runs failure detection
//! - the anti-entropy loop asks the stalest active peers for what we lack
//!
//! Sends are best-effort: every failure is folded into the target's
//! reliability and failure count and never reaches the caller.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use moka::sync::Cache;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use hive_core::config::{validate_quorum_threshold, GossipConfig};
use hive_core::errors::{HiveError, HiveResult, TransportError};
use hive_core::models::{AgentId, Priority};
use hive_core::traits::{NoQuarantine, QuarantineOracle, Transport};
use hive_crdt::VectorClock;
use hive_observability::{anti_entropy_span, gossip_round_span, MetricsCollector};

use crate::events::{EventBus, FilteredReceiver, GossipEvent, GossipEventKind};
use crate::message::{GossipMessage, GossipPayload, MessageType, Rumor};
use crate::peer::{PeerState, PeerTable};

/// What [`GossipProtocol::receive`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    Accepted(MessageType),
    Duplicate,
    Quarantined,
    /// One of our own messages came back.
    Own,
    /// Undecodable frame or protocol already shut down.
    Rejected,
}

pub struct GossipProtocol {
    local_id: AgentId,
    local_address: String,
    capabilities: Vec<String>,
    config: GossipConfig,
    clock: Arc<RwLock<VectorClock>>,
    transport: Arc<dyn Transport>,
    quarantine: Arc<dyn QuarantineOracle>,
    peers: PeerTable,
    /// Peers the topology links us to. Empty means unrestricted.
    neighbors: RwLock<BTreeSet<AgentId>>,
    pending: Mutex<VecDeque<GossipMessage>>,
    seen: Cache<String, ()>,
    events: EventBus,
    metrics: Arc<MetricsCollector>,
    quorum_threshold: AtomicU64,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl GossipProtocol {
    pub fn new(
        local_id: AgentId,
        local_address: impl Into<String>,
        config: GossipConfig,
        clock: Arc<RwLock<VectorClock>>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let seen = Cache::builder()
            .max_capacity(config.seen_cache_capacity)
            .time_to_live(Duration::from_secs(config.seen_cache_ttl_secs))
            .build();
        Self {
            local_id,
            local_address: local_address.into(),
            capabilities: Vec::new(),
            peers: PeerTable::new(config.initial_reliability),
            neighbors: RwLock::new(BTreeSet::new()),
            quorum_threshold: AtomicU64::new(config.min_quorum_threshold.to_bits()),
            config,
            clock,
            transport,
            quarantine: Arc::new(NoQuarantine),
            pending: Mutex::new(VecDeque::new()),
            seen,
            events: EventBus::new(),
            metrics: Arc::new(MetricsCollector::new()),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_quarantine(mut self, quarantine: Arc<dyn QuarantineOracle>) -> Self {
        self.quarantine = quarantine;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn local_id(&self) -> &AgentId {
        &self.local_id
    }

    pub fn config(&self) -> &GossipConfig {
        &self.config
    }

    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<GossipEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_kinds(&self, kinds: &[GossipEventKind]) -> FilteredReceiver {
        self.events.subscribe_kinds(kinds)
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    // --- Membership ---

    /// Register a peer. Returns `true` if it was unknown.
    pub fn add_peer(&self, agent_id: &AgentId, address: &str, capabilities: &[String]) -> bool {
        if *agent_id == self.local_id {
            return false;
        }
        self.peers.upsert(agent_id, address, capabilities, Utc::now())
    }

    pub fn remove_peer(&self, agent_id: &AgentId) -> Option<PeerState> {
        self.peers.remove(agent_id)
    }

    /// Restrict epidemic fanout to the given agents. Heartbeats, direct
    /// sends, and anti-entropy still reach every known peer. An empty set
    /// lifts the restriction.
    pub fn set_neighbors(&self, neighbors: impl IntoIterator<Item = AgentId>) {
        let neighbors: BTreeSet<AgentId> = neighbors.into_iter().collect();
        debug!(neighbors = neighbors.len(), "gossip neighbors updated");
        *self.neighbors.write().unwrap_or_else(|e| e.into_inner()) = neighbors;
    }

    pub fn neighbors(&self) -> BTreeSet<AgentId> {
        self.neighbors.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Whether `agent_id` may receive epidemic traffic from us.
    pub fn is_neighbor(&self, agent_id: &AgentId) -> bool {
        let neighbors = self.neighbors.read().unwrap_or_else(|e| e.into_inner());
        neighbors.is_empty() || neighbors.contains(agent_id)
    }

    // --- Quorum ---

    pub fn quorum_threshold(&self) -> f64 {
        f64::from_bits(self.quorum_threshold.load(Ordering::Relaxed))
    }

    /// Rejected without effect outside (0, 1].
    pub fn set_quorum_threshold(&self, threshold: f64) -> HiveResult<()> {
        validate_quorum_threshold(threshold)?;
        self.quorum_threshold
            .store(threshold.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    /// `ceil(known peers × threshold)`.
    pub fn min_quorum(&self) -> usize {
        (self.peers.len() as f64 * self.quorum_threshold()).ceil() as usize
    }

    pub fn has_quorum(&self) -> bool {
        self.peers.active_count() >= self.min_quorum()
    }

    // --- Origination ---

    /// Queue an epidemic message for the next round. Returns its id.
    pub fn broadcast(&self, payload: GossipPayload, priority: Priority) -> HiveResult<String> {
        if self.is_shut_down() {
            return Err(HiveError::ShutDown);
        }
        let message = GossipMessage::originate(
            self.local_id.clone(),
            None,
            self.clock_snapshot(),
            payload,
            self.config.max_ttl,
            priority,
        );
        let id = message.message_id.clone();
        self.seen.insert(id.clone(), ());
        self.enqueue(message);
        Ok(id)
    }

    /// Send straight to one peer now. Returns whether the transport accepted it.
    pub async fn send_direct(&self, target: &AgentId, payload: GossipPayload, priority: Priority) -> bool {
        if self.is_shut_down() {
            return false;
        }
        let Some(peer) = self.peers.get(target) else {
            debug!(target = %target, "direct send to unknown peer skipped");
            return false;
        };
        let message = GossipMessage::originate(
            self.local_id.clone(),
            Some(target.clone()),
            self.clock_snapshot(),
            payload,
            1,
            priority,
        );
        self.deliver(&message, &[peer]).await == 1
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Queue a message, shedding load when the queue is full: the oldest
    /// non-critical message goes first; a non-critical arrival is dropped
    /// if everything queued is critical.
    fn enqueue(&self, message: GossipMessage) {
        let mut pending = lock(&self.pending);
        if pending.len() >= self.config.max_pending_messages {
            match pending.iter().position(|m| m.priority != Priority::Critical) {
                Some(oldest) => {
                    if let Some(shed) = pending.remove(oldest) {
                        debug!(message_id = %shed.message_id, "pending queue full, oldest message shed");
                    }
                    self.metrics.gossip.record_dropped();
                }
                None if message.priority != Priority::Critical => {
                    debug!(message_id = %message.message_id, "pending queue full, message dropped");
                    self.metrics.gossip.record_dropped();
                    return;
                }
                None => {}
            }
        }
        pending.push_back(message);
    }

    // --- Target selection ---

    /// Fanout for a message of `priority` given the current backlog.
    pub fn effective_fanout(&self, priority: Priority, backlog: usize) -> usize {
        let mut fanout = (self.config.fanout as f64 * priority.fanout_multiplier()).ceil() as usize;
        if self.config.adaptive_gossip
            && backlog > self.config.batch_size * 2
            && priority <= Priority::Medium
        {
            fanout /= 2;
        }
        fanout.max(1)
    }

    /// Best-ranked active neighbors that have not yet seen `message`.
    pub fn select_targets(&self, message: &GossipMessage, backlog: usize) -> Vec<PeerState> {
        if let Some(target) = &message.target_agent {
            return self
                .peers
                .get(target)
                .filter(|p| p.is_active())
                .into_iter()
                .collect();
        }
        let fanout = self.effective_fanout(message.priority, backlog);
        self.peers.ranked(
            |id| {
                message.has_visited(id)
                    || *id == self.local_id
                    || *id == message.source_agent
                    || !self.is_neighbor(id)
            },
            fanout,
        )
    }

    // --- Rounds ---

    /// One propagation round.
    pub async fn run_round(&self) {
        let backlog = self.pending_len();
        let span = gossip_round_span!(self.local_id, backlog);
        async {
            let batch: Vec<GossipMessage> = {
                let mut pending = lock(&self.pending);
                let take = self.config.batch_size.min(pending.len());
                pending.drain(..take).collect()
            };
            let sends = batch.iter().map(|message| {
                let targets = self.select_targets(message, backlog);
                async move { self.deliver(message, &targets).await }
            });
            let delivered: usize = join_all(sends).await.into_iter().sum();

            self.send_heartbeat().await;
            self.detect_failures();
            self.metrics.gossip.record_round();
            debug!(messages = batch.len(), delivered, "gossip round complete");
        }
        .instrument(span)
        .await
    }

    /// Heartbeat every known peer, including inactive ones so they can
    /// rejoin as soon as they answer.
    pub async fn send_heartbeat(&self) {
        let peers = self.peers.snapshot();
        if peers.is_empty() {
            return;
        }
        let message = GossipMessage::originate(
            self.local_id.clone(),
            None,
            self.clock_snapshot(),
            GossipPayload::Heartbeat {
                address: self.local_address.clone(),
                capabilities: self.capabilities.clone(),
            },
            1,
            Priority::Low,
        );
        self.deliver(&message, &peers).await;
    }

    pub fn detect_failures(&self) -> Vec<AgentId> {
        self.detect_failures_at(Utc::now())
    }

    /// Failure detection against an explicit clock reading.
    pub fn detect_failures_at(&self, now: DateTime<Utc>) -> Vec<AgentId> {
        let window = chrono::Duration::from_std(self.config.failure_window())
            .unwrap_or_else(|_| chrono::Duration::zero());
        let failed = self.peers.detect_failures(
            now,
            window,
            self.config.failure_threshold,
            self.config.failure_reliability_penalty,
        );
        failed
            .into_iter()
            .map(|(agent_id, reliability)| {
                warn!(agent_id = %agent_id, reliability, "peer marked inactive");
                self.metrics.gossip.record_node_failed();
                self.events.publish(GossipEvent::NodeFailed {
                    agent_id: agent_id.clone(),
                    reliability,
                });
                agent_id
            })
            .collect()
    }

    /// Ask the stalest active peers for what we are missing.
    /// Returns how many requests the transport accepted.
    pub async fn run_anti_entropy(&self) -> usize {
        let targets = self.peers.stalest(self.config.anti_entropy_peers);
        if targets.is_empty() {
            return 0;
        }
        let span = anti_entropy_span!(self.local_id, targets.len());
        async {
            let version = self.clock_snapshot();
            let requests = targets.iter().map(|peer| {
                let payload = GossipPayload::SyncRequest {
                    version: version.clone(),
                };
                async move {
                    self.send_direct(&peer.agent_id, payload, Priority::Medium)
                        .await
                }
            });
            let sent = join_all(requests).await.into_iter().filter(|ok| *ok).count();
            debug!(peers = targets.len(), sent, "anti-entropy requests sent");
            sent
        }
        .instrument(span)
        .await
    }

    /// Send `message` to each target concurrently and fold the outcomes into
    /// the peer table. Returns how many sends succeeded.
    async fn deliver(&self, message: &GossipMessage, targets: &[PeerState]) -> usize {
        if targets.is_empty() {
            return 0;
        }
        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(message_id = %message.message_id, error = %e, "message could not be encoded");
                return 0;
            }
        };
        let timeout = self.config.send_timeout();
        let sends = targets.iter().map(|peer| {
            let frame = frame.clone();
            async move {
                let started = Instant::now();
                let result = match tokio::time::timeout(timeout, self.transport.send(&peer.address, frame)).await {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::Timeout {
                        target: peer.address.clone(),
                        timeout_ms: self.config.send_timeout_ms,
                    }),
                };
                (peer, started.elapsed(), result)
            }
        });

        let mut delivered = 0;
        for (peer, elapsed, result) in join_all(sends).await {
            match result {
                Ok(()) => {
                    delivered += 1;
                    self.peers.record_send_success(
                        &peer.agent_id,
                        elapsed.as_secs_f64() * 1000.0,
                        self.config.reliability_alpha,
                    );
                }
                Err(e) => {
                    debug!(target = %peer.agent_id, error = %e, "send failed");
                    self.metrics.gossip.record_send_failure();
                    self.peers
                        .record_send_failure(&peer.agent_id, self.config.send_failure_penalty);
                }
            }
        }
        self.metrics.gossip.record_sent(delivered as u64);
        delivered
    }

    // --- Receipt ---

    pub fn receive_frame(&self, frame: &[u8]) -> Received {
        match GossipMessage::decode(frame) {
            Ok(message) => self.receive(message),
            Err(e) => {
                warn!(error = %e, "undecodable gossip frame");
                self.metrics.gossip.record_dropped();
                Received::Rejected
            }
        }
    }

    /// Admit, deduplicate, dispatch, and queue the continuation.
    pub fn receive(&self, message: GossipMessage) -> Received {
        if self.is_shut_down() {
            return Received::Rejected;
        }
        let sender = message.sender().clone();
        if self.quarantine.is_agent_quarantined(&message.source_agent)
            || self.quarantine.is_agent_quarantined(&sender)
        {
            debug!(source = %message.source_agent, sender = %sender, "quarantined gossip dropped");
            self.metrics.gossip.record_dropped();
            return Received::Quarantined;
        }
        let fresh = self
            .seen
            .entry(message.message_id.clone())
            .or_insert(())
            .is_fresh();
        if !fresh {
            self.metrics.gossip.record_duplicate();
            return Received::Duplicate;
        }
        if message.source_agent == self.local_id {
            return Received::Own;
        }
        self.metrics.gossip.record_received();

        let now = Utc::now();
        if let GossipPayload::Heartbeat {
            address,
            capabilities,
        } = &message.payload
        {
            if message.source_agent == sender
                && self.peers.upsert(&sender, address, capabilities, now)
            {
                info!(agent_id = %sender, address = %address, "agent discovered");
                self.events.publish(GossipEvent::AgentDiscovered {
                    agent_id: sender.clone(),
                    address: address.clone(),
                    capabilities: capabilities.clone(),
                });
            }
        }
        if self.peers.mark_alive(&sender, now) == Some(true) {
            info!(agent_id = %sender, "peer recovered");
            self.events
                .publish(GossipEvent::NodeRecovered { agent_id: sender.clone() });
        }
        // A relayed copy carries the origin's clock, not the relay's.
        if sender == message.source_agent {
            self.peers.observe_clock(&sender, &message.vector_clock);
        }

        let message_type = message.message_type();
        if let Some(next) = message.continuation(&self.local_id) {
            self.enqueue(next);
        }
        self.dispatch(message);
        Received::Accepted(message_type)
    }

    fn dispatch(&self, message: GossipMessage) {
        let direct = message.is_direct();
        let from = message.source_agent;
        match message.payload {
            GossipPayload::Update { delta } => {
                self.events.publish(GossipEvent::UpdateReceived {
                    from,
                    message_id: message.message_id,
                    delta,
                    vector_clock: message.vector_clock,
                    direct,
                });
            }
            GossipPayload::SyncRequest { version } => {
                self.events
                    .publish(GossipEvent::SyncRequested { from, version });
            }
            GossipPayload::SyncResponse { delta, version } => {
                self.events.publish(GossipEvent::SyncResponseReceived {
                    from,
                    delta,
                    version,
                });
            }
            GossipPayload::Heartbeat { .. } => {}
            GossipPayload::Rumor(Rumor::NodeLeaving { agent_id }) => {
                if agent_id != self.local_id && self.peers.remove(&agent_id).is_some() {
                    info!(agent_id = %agent_id, "peer left");
                    self.events.publish(GossipEvent::NodeLeft { agent_id });
                }
            }
        }
    }

    // --- Lifecycle ---

    /// Spawn the round and anti-entropy loops.
    pub fn start(self: &Arc<Self>) {
        let round = {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(this.config.gossip_interval());
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = this.cancel.cancelled() => break,
                        _ = ticker.tick() => this.run_round().await,
                    }
                }
            })
        };
        let anti_entropy = {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(this.config.sync_interval());
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                // The first tick fires at once; skip it so startup is quiet.
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = this.cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            this.run_anti_entropy().await;
                        }
                    }
                }
            })
        };
        lock(&self.tasks).extend([round, anti_entropy]);
        info!(agent_id = %self.local_id, "gossip started");
    }

    /// Stop the loops, announce departure without waiting, and release
    /// peer state.
    pub fn shutdown(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();

        let farewell = GossipMessage::originate(
            self.local_id.clone(),
            None,
            self.clock_snapshot(),
            GossipPayload::Rumor(Rumor::NodeLeaving {
                agent_id: self.local_id.clone(),
            }),
            self.config.max_ttl,
            Priority::Critical,
        );
        let addresses: Vec<String> = self.peers.active().into_iter().map(|p| p.address).collect();
        match farewell.encode() {
            Ok(frame) if !addresses.is_empty() => {
                let transport = Arc::clone(&self.transport);
                let timeout = self.config.send_timeout();
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        let sends = addresses.iter().map(|address| {
                            tokio::time::timeout(timeout, transport.send(address, frame.clone()))
                        });
                        join_all(sends).await;
                    });
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "farewell could not be encoded"),
        }

        self.peers.clear();
        lock(&self.pending).clear();
        self.seen.invalidate_all();
        lock(&self.tasks).clear();
        info!(agent_id = %self.local_id, "gossip shut down");
    }

    fn clock_snapshot(&self) -> VectorClock {
        self.clock
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
