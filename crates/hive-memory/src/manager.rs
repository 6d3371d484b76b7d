//! DistributedMemoryManager: one agent's replica and everything that keeps
//! it converging.
//!
//! The manager owns the local store and vector clock, shares the clock with
//! its [`GossipProtocol`], and keeps a [`TopologyManager`] whose node set
//! always includes the local agent. Each mutable table sits behind its own
//! lock; when more than one is held the order is store, resolver, clock,
//! then topology.
//!
//! ## Delta flow
//!
//! Outbound, the sync task computes per peer the entries that peer's last
//! reported clock does not cover and sends them as a direct update.
//! Inbound, a delta is opened (checksum and Merkle root verified), held if
//! it depends on deltas not yet applied, and otherwise applied operation by
//! operation:
//!
//! - no local entry: inserted
//! - incoming clock after the entry's: taken (merge operations combine)
//! - before or equal: skipped
//! - concurrent: routed through the [`ConflictResolver`]
//!
//! A delta that fails integrity checks is rejected whole and counted as a
//! failed sync; an operation the resolver cannot handle is dropped alone.
//! Applied deltas that arrived addressed to this agent are re-propagated
//! epidemically when dissemination is enabled.
//!
//! The local clock only advances past another agent's writes when a delta
//! addressed to us carries that agent's version: such a delta was computed
//! against our own reported clock, so it holds everything the version
//! claims. Relayed deltas and context sends update entries but not the
//! clock, leaving whatever they skipped visible to the next sync.
//!
//! ## Periodic tasks
//!
//! [`DistributedMemoryManager::start`] spawns the gossip loops plus the event
//! handler, the per-peer sync cycle, topology optimization, and metrics
//! maintenance. All stop on [`DistributedMemoryManager::shutdown`].

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use hive_core::config::HiveConfig;
use hive_core::errors::{ConflictError, HiveError, HiveResult};
use hive_core::models::{AgentId, AgentRole, Priority};
use hive_core::traits::{Compressor, QuarantineOracle, Transport};
use hive_crdt::{
    incoming_wins_lww, CausalOrder, ConflictResolver, EntryMetadata, MemoryDelta, MemoryEntry,
    MemoryOperation, MemoryValue, OperationKind, Resolution, ResolvedConflict, ResolverStats,
    VectorClock,
};
use hive_gossip::{GossipEvent, GossipPayload, GossipProtocol, PeerState};
use hive_observability::{delta_apply_span, topology_span, MetricsCollector, MetricsSnapshot};
use hive_topology::{AgentNode, MemoryTopology, OptimizationOutcome, ShardCoordinator, TopologyManager};

use crate::buffer::{DependencyBuffer, HeldDelta};
use crate::codec::ZstdCompressor;
use crate::context::{self, ContextUpdate, PropagationOptions, PropagationReport};
use crate::store::MemoryStore;

/// Placement and lifetime of a local write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    pub namespace: String,
    pub ttl_secs: Option<u64>,
    pub priority: Priority,
}

impl WriteOptions {
    pub fn in_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = Some(ttl_secs);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            ttl_secs: None,
            priority: Priority::Medium,
        }
    }
}

/// Per-operation tally of one applied delta.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub applied: usize,
    /// Already covered by the local entry.
    pub skipped: usize,
    /// Concurrent with the local entry and resolved.
    pub conflicts: usize,
    /// Dropped by a resolution error.
    pub dropped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied(ApplyReport),
    /// Seen within the retention window; nothing to do.
    AlreadyApplied,
    /// Held until its dependencies are applied.
    Buffered,
    /// Failed integrity checks, or the manager is shut down.
    Rejected,
}

impl ApplyOutcome {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, ApplyOutcome::Rejected)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub removed: usize,
    pub retained: usize,
    pub dropped_buffered: usize,
}

/// Builds a [`DistributedMemoryManager`]. Config is validated before
/// anything is constructed.
pub struct ManagerBuilder {
    agent_id: AgentId,
    address: String,
    transport: Arc<dyn Transport>,
    config: HiveConfig,
    role: AgentRole,
    capabilities: Vec<String>,
    trust: f64,
    compressor: Option<Arc<dyn Compressor>>,
    quarantine: Option<Arc<dyn QuarantineOracle>>,
    coordinator: Option<Arc<dyn ShardCoordinator>>,
}

impl ManagerBuilder {
    pub fn new(
        agent_id: impl Into<AgentId>,
        address: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            address: address.into(),
            transport,
            config: HiveConfig::default(),
            role: AgentRole::default(),
            capabilities: Vec::new(),
            trust: 1.0,
            compressor: None,
            quarantine: None,
            coordinator: None,
        }
    }

    pub fn config(mut self, config: HiveConfig) -> Self {
        self.config = config;
        self
    }

    pub fn role(mut self, role: AgentRole) -> Self {
        self.role = role;
        self
    }

    pub fn capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn trust(mut self, trust: f64) -> Self {
        self.trust = trust;
        self
    }

    /// Defaults to zstd at the configured level.
    pub fn compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    pub fn quarantine(mut self, quarantine: Arc<dyn QuarantineOracle>) -> Self {
        self.quarantine = Some(quarantine);
        self
    }

    pub fn shard_coordinator(mut self, coordinator: Arc<dyn ShardCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn build(self) -> HiveResult<DistributedMemoryManager> {
        self.config.validate()?;
        let config = self.config;

        let clock = Arc::new(RwLock::new(VectorClock::new()));
        let metrics = Arc::new(MetricsCollector::new());
        let compressor: Arc<dyn Compressor> = match self.compressor {
            Some(compressor) => compressor,
            None => Arc::new(ZstdCompressor::new(config.sync.compression_level)),
        };

        let mut gossip = GossipProtocol::new(
            self.agent_id.clone(),
            self.address.clone(),
            config.gossip.clone(),
            Arc::clone(&clock),
            self.transport,
        )
        .with_capabilities(self.capabilities.clone())
        .with_metrics(Arc::clone(&metrics));
        if let Some(quarantine) = self.quarantine {
            gossip = gossip.with_quarantine(quarantine);
        }

        let mut topology = match self.coordinator {
            Some(coordinator) => TopologyManager::with_coordinator(&config.topology, coordinator),
            None => TopologyManager::new(&config.topology),
        };
        let local = AgentNode::new(self.agent_id.clone(), self.address)
            .with_role(self.role)
            .with_capabilities(self.capabilities)
            .with_trust(self.trust);
        topology.add_agent(local, 0.0)?;

        let applied = Cache::builder()
            .time_to_live(config.sync.applied_delta_retention())
            .build();

        info!(agent_id = %self.agent_id, "memory manager created");
        Ok(DistributedMemoryManager {
            agent_id: self.agent_id,
            clock,
            store: RwLock::new(MemoryStore::new()),
            resolver: Mutex::new(ConflictResolver::new()),
            compressor,
            gossip: Arc::new(gossip),
            topology: RwLock::new(topology),
            buffer: Mutex::new(DependencyBuffer::new(config.sync.max_buffered_deltas)),
            applied,
            last_sent: DashMap::new(),
            metrics,
            sync_stopped: AtomicBool::new(false),
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            config,
        })
    }
}

pub struct DistributedMemoryManager {
    agent_id: AgentId,
    config: HiveConfig,
    clock: Arc<RwLock<VectorClock>>,
    store: RwLock<MemoryStore>,
    resolver: Mutex<ConflictResolver>,
    compressor: Arc<dyn Compressor>,
    gossip: Arc<GossipProtocol>,
    topology: RwLock<TopologyManager>,
    buffer: Mutex<DependencyBuffer>,
    /// Ids of deltas applied within the retention window.
    applied: Cache<String, ()>,
    /// Last delta sent to each peer, with the local clock it was sealed at.
    last_sent: DashMap<AgentId, (String, VectorClock)>,
    metrics: Arc<MetricsCollector>,
    sync_stopped: AtomicBool,
    started: AtomicBool,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

enum OpResult {
    Applied,
    Skipped,
    Resolved(ResolvedConflict),
    Dropped,
}

impl DistributedMemoryManager {
    pub fn builder(
        agent_id: impl Into<AgentId>,
        address: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> ManagerBuilder {
        ManagerBuilder::new(agent_id, address, transport)
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn config(&self) -> &HiveConfig {
        &self.config
    }

    pub fn gossip(&self) -> &Arc<GossipProtocol> {
        &self.gossip
    }

    pub fn clock(&self) -> VectorClock {
        read(&self.clock).clone()
    }

    /// A copy of the current topology.
    pub fn topology(&self) -> MemoryTopology {
        read(&self.topology).topology().clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    // --- Local store ---

    pub fn set(&self, key: impl Into<String>, value: impl Into<MemoryValue>) -> HiveResult<VectorClock> {
        self.set_with(key, value, &WriteOptions::default())
    }

    /// Write `value`, stamping it with the incremented local clock.
    pub fn set_with(
        &self,
        key: impl Into<String>,
        value: impl Into<MemoryValue>,
        options: &WriteOptions,
    ) -> HiveResult<VectorClock> {
        let value = value.into();
        let entry = self.write_local(key.into(), options.clone(), |_| Ok(Some(value)))?;
        Ok(entry.clock)
    }

    /// Replace the value with a tombstone. Returns `false` (and writes
    /// nothing) if the key held no readable value.
    pub fn delete(&self, key: &str) -> HiveResult<bool> {
        self.ensure_running()?;
        let now = Utc::now();
        let options = {
            let store = read(&self.store);
            match store.entry(key) {
                Some(entry) if entry.visible_value(now).is_some() => WriteOptions {
                    namespace: entry.metadata.namespace.clone(),
                    ttl_secs: None,
                    priority: entry.metadata.priority,
                },
                _ => return Ok(false),
            }
        };
        self.write_local(key.to_string(), options, |_| Ok(None))?;
        Ok(true)
    }

    /// Combine `value` into the current value with its kind's combine
    /// function. An absent key is simply set.
    pub fn merge(&self, key: impl Into<String>, value: MemoryValue) -> HiveResult<VectorClock> {
        let key = key.into();
        let now = Utc::now();
        let entry = self.write_local(key.clone(), WriteOptions::default(), |existing| {
            match existing.and_then(|e| e.visible_value(now)) {
                None => Ok(Some(value)),
                Some(current) => current.combine(&value).map(Some).ok_or_else(|| {
                    HiveError::from(ConflictError::IncompatibleMerge {
                        key: key.clone(),
                        existing: current.kind_name().to_string(),
                        incoming: value.kind_name().to_string(),
                    })
                }),
            }
        })?;
        Ok(entry.clock)
    }

    pub fn get(&self, key: &str) -> Option<MemoryValue> {
        read(&self.store).get(key, Utc::now()).cloned()
    }

    /// The raw entry, tombstones included.
    pub fn entry(&self, key: &str) -> Option<MemoryEntry> {
        read(&self.store).entry(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        read(&self.store).keys(Utc::now())
    }

    pub fn len(&self) -> usize {
        read(&self.store).len(Utc::now())
    }

    pub fn is_empty(&self) -> bool {
        read(&self.store).is_empty(Utc::now())
    }

    pub fn entries_in_namespace(&self, namespace: &str) -> Vec<MemoryEntry> {
        read(&self.store)
            .entries_in_namespace(namespace, Utc::now())
            .into_iter()
            .cloned()
            .collect()
    }

    /// Stored entries over the configured capacity, capped at 1.
    pub fn memory_pressure(&self) -> f64 {
        let total = read(&self.store).total_len() as f64;
        (total / self.config.sync.max_entries.max(1) as f64).min(1.0)
    }

    fn write_local(
        &self,
        key: String,
        options: WriteOptions,
        value_for: impl FnOnce(Option<&MemoryEntry>) -> HiveResult<Option<MemoryValue>>,
    ) -> HiveResult<MemoryEntry> {
        self.ensure_running()?;
        let mut store = write(&self.store);
        let value = value_for(store.entry(&key))?;
        let clock = {
            let mut clock = write(&self.clock);
            clock.increment(self.agent_id.as_str());
            // The entry may hold a relayed write the local clock never adopted.
            match store.entry(&key) {
                Some(existing) => clock.merged(&existing.clock),
                None => clock.clone(),
            }
        };
        let entry = MemoryEntry {
            key,
            value,
            clock,
            metadata: EntryMetadata {
                namespace: options.namespace,
                ttl_secs: options.ttl_secs,
                priority: options.priority,
                source_agent: self.agent_id.clone(),
            },
            timestamp: Utc::now(),
        };
        debug!(key = %entry.key, tombstone = entry.is_tombstone(), "local write");
        store.put(entry.clone());
        Ok(entry)
    }

    // --- Deltas ---

    /// Seal every entry `last_sync_version` does not cover into a delta for
    /// `target`. `None` when the target is up to date.
    #[instrument(skip_all, fields(agent_id = %self.agent_id, target = %target))]
    pub fn create_delta_sync(
        &self,
        target: &AgentId,
        last_sync_version: &VectorClock,
    ) -> HiveResult<Option<MemoryDelta>> {
        Ok(self
            .build_delta(target, last_sync_version)?
            .map(|(delta, _)| delta))
    }

    fn build_delta(
        &self,
        target: &AgentId,
        version: &VectorClock,
    ) -> HiveResult<Option<(MemoryDelta, VectorClock)>> {
        self.ensure_running()?;
        let (operations, local) = {
            let store = read(&self.store);
            let operations: Vec<MemoryOperation> = store
                .changed_since(version)
                .into_iter()
                .map(MemoryOperation::from_entry)
                .collect();
            (operations, read(&self.clock).clone())
        };
        if operations.is_empty() {
            return Ok(None);
        }

        // Chain onto the previous delta until the target acknowledges it.
        let dependencies = match self.last_sent.get(target) {
            Some(previous) if !previous.1.covered_by(version) => vec![previous.0.clone()],
            _ => Vec::new(),
        };
        let delta = MemoryDelta::seal(
            self.agent_id.clone(),
            vec![target.clone()],
            &local,
            &operations,
            dependencies,
            self.compressor.as_ref(),
        )?;
        self.metrics
            .sync
            .record_sent(delta.payload.data.len() as u64, delta.payload.ratio);
        debug!(
            delta_id = %delta.delta_id,
            operations = delta.operation_count,
            bytes = delta.payload.data.len(),
            "delta created"
        );
        Ok(Some((delta, local)))
    }

    /// Apply a delta. Returns `false` only if it was rejected; buffered and
    /// already-applied deltas count as accepted.
    pub fn apply_delta(&self, delta: &MemoryDelta) -> bool {
        self.apply_delta_detailed(delta).is_accepted()
    }

    pub fn apply_delta_detailed(&self, delta: &MemoryDelta) -> ApplyOutcome {
        self.ingest(Arc::new(delta.clone()), true)
    }

    fn ingest(&self, delta: Arc<MemoryDelta>, disseminate: bool) -> ApplyOutcome {
        if self.is_shut_down() {
            return ApplyOutcome::Rejected;
        }
        if self.applied.contains_key(&delta.delta_id) {
            return ApplyOutcome::AlreadyApplied;
        }
        if lock(&self.buffer).contains(&delta.delta_id) {
            return ApplyOutcome::Buffered;
        }

        let operations = match delta.open(self.compressor.as_ref()) {
            Ok(operations) => operations,
            Err(e) => {
                warn!(delta_id = %delta.delta_id, source = %delta.source_agent, error = %e, "delta rejected");
                self.metrics.sync.record_failure();
                return ApplyOutcome::Rejected;
            }
        };
        let version = match delta.version_clock() {
            Ok(version) => version,
            Err(e) => {
                warn!(delta_id = %delta.delta_id, error = %e, "delta rejected");
                self.metrics.sync.record_failure();
                return ApplyOutcome::Rejected;
            }
        };

        let held = HeldDelta {
            delta,
            operations,
            version,
            disseminate,
            held_at: Instant::now(),
        };
        // Dependencies order clock adoption, which only addressed deltas do.
        let ready = !held.delta.is_addressed_to(&self.agent_id)
            || held
                .delta
                .dependencies
                .iter()
                .all(|dep| self.applied.contains_key(dep));
        if !ready {
            self.metrics.sync.record_buffered();
            if let Some(evicted) = lock(&self.buffer).hold(held) {
                warn!(delta_id = %evicted.delta_id(), "dependency buffer full, oldest delta dropped");
                self.metrics.sync.record_failure();
            }
            return ApplyOutcome::Buffered;
        }

        let report = self.commit(held);
        self.release_buffered(Instant::now());
        ApplyOutcome::Applied(report)
    }

    /// Apply every held delta that is now ready or has waited too long.
    fn release_buffered(&self, now: Instant) -> usize {
        let ready = lock(&self.buffer).drain_ready(
            |id| self.applied.contains_key(id),
            now,
            self.config.sync.dependency_wait(),
        );
        let released = ready.len();
        for held in ready {
            self.commit(held);
        }
        released
    }

    fn commit(&self, held: HeldDelta) -> ApplyReport {
        let HeldDelta {
            delta,
            operations,
            version,
            disseminate,
            ..
        } = held;
        let _span = delta_apply_span!(delta.delta_id, delta.source_agent).entered();
        let now = Utc::now();
        let mut report = ApplyReport::default();
        {
            let mut store = write(&self.store);
            let mut resolver = lock(&self.resolver);
            let mut resolved = Vec::new();
            for operation in operations {
                match apply_operation(&mut store, &resolver, operation, now) {
                    OpResult::Applied => report.applied += 1,
                    OpResult::Skipped => report.skipped += 1,
                    OpResult::Resolved(conflict) => {
                        report.conflicts += 1;
                        resolved.push(conflict);
                    }
                    OpResult::Dropped => {
                        report.dropped += 1;
                        resolver.record_failure();
                    }
                }
            }
            resolver.record(resolved);
            if delta.is_addressed_to(&self.agent_id) && !delta.personalized {
                write(&self.clock).merge(&version);
            }
        }
        if let Some(node) = write(&self.topology)
            .topology_mut()
            .node_mut(&delta.source_agent)
        {
            node.touch(now, Some(&version));
        }
        self.applied.insert(delta.delta_id.clone(), ());

        let sync = &self.metrics.sync;
        sync.record_applied((report.applied + report.conflicts) as u64, report.conflicts as u64);
        sync.record_dropped(report.dropped as u64);
        sync.record_success();
        info!(
            applied = report.applied,
            skipped = report.skipped,
            conflicts = report.conflicts,
            dropped = report.dropped,
            "delta applied"
        );

        if disseminate && self.config.sync.dissemination_enabled && !delta.personalized {
            let payload = GossipPayload::Update { delta };
            if let Err(e) = self.gossip.broadcast(payload, Priority::Medium) {
                debug!(error = %e, "delta not re-propagated");
            }
        }
        report
    }

    // --- Gossip events ---

    /// React to one gossip event. The event task calls this for everything
    /// the protocol publishes; embedders running their own loop may too.
    pub async fn handle_event(&self, event: GossipEvent) {
        if self.is_shut_down() {
            return;
        }
        match event {
            GossipEvent::UpdateReceived { delta, direct, .. } => {
                if !self.is_sync_stopped() {
                    self.ingest(delta, direct);
                }
            }
            GossipEvent::SyncRequested { from, version } => {
                if !self.is_sync_stopped() {
                    self.answer_sync_request(&from, &version).await;
                }
            }
            GossipEvent::SyncResponseReceived { delta, .. } => {
                if let Some(delta) = delta.filter(|_| !self.is_sync_stopped()) {
                    self.ingest(delta, false);
                }
            }
            GossipEvent::AgentDiscovered {
                agent_id,
                address,
                capabilities,
            } => self.on_agent_discovered(agent_id, address, capabilities),
            GossipEvent::NodeFailed {
                agent_id,
                reliability,
            } => {
                warn!(agent_id = %agent_id, reliability, "peer marked inactive");
            }
            GossipEvent::NodeRecovered { agent_id } => {
                if let Some(node) = write(&self.topology).topology_mut().node_mut(&agent_id) {
                    node.touch(Utc::now(), None);
                }
            }
            GossipEvent::NodeLeft { agent_id } => self.forget_agent(&agent_id),
        }
    }

    async fn answer_sync_request(&self, from: &AgentId, version: &VectorClock) {
        let (delta, sealed_at) = match self.build_delta(from, version) {
            Ok(Some((delta, local))) => (Some(delta), Some(local)),
            Ok(None) => (None, None),
            Err(e) => {
                warn!(requester = %from, error = %e, "sync response could not be built");
                return;
            }
        };
        let sent_id = delta.as_ref().map(|d| d.delta_id.clone());
        let payload = GossipPayload::SyncResponse {
            delta: delta.map(Arc::new),
            version: self.clock(),
        };
        let delivered = self.gossip.send_direct(from, payload, Priority::Medium).await;
        if let (true, Some(id), Some(local)) = (delivered, sent_id, sealed_at) {
            self.last_sent.insert(from.clone(), (id, local));
        }
    }

    fn on_agent_discovered(&self, agent_id: AgentId, address: String, capabilities: Vec<String>) {
        let pressure = self.memory_pressure();
        let mut topology = write(&self.topology);
        if let Some(node) = topology.topology_mut().node_mut(&agent_id) {
            node.touch(Utc::now(), None);
            return;
        }
        let node = AgentNode::new(agent_id, address).with_capabilities(capabilities);
        if topology.upsert_agent(node, pressure).is_some() {
            self.publish_neighbors(&topology);
        }
    }

    fn forget_agent(&self, agent_id: &AgentId) {
        self.last_sent.remove(agent_id);
        let pressure = self.memory_pressure();
        let mut topology = write(&self.topology);
        match topology.remove_agent(agent_id, pressure) {
            Ok(_) => self.publish_neighbors(&topology),
            Err(e) => debug!(agent_id = %agent_id, error = %e, "departed agent was not in topology"),
        }
    }

    /// Hand the local agent's topology links to gossip, which restricts
    /// fanout to them. The sync cycle follows the same links.
    fn publish_neighbors(&self, topology: &TopologyManager) {
        let neighbors = topology.topology().neighbors(&self.agent_id);
        self.gossip.set_neighbors(neighbors.into_iter().cloned());
    }

    // --- Membership and topology ---

    /// Register an agent with both the topology and the gossip peer table.
    pub fn add_agent(&self, node: AgentNode) -> HiveResult<OptimizationOutcome> {
        self.ensure_running()?;
        let agent_id = node.agent_id.clone();
        let address = node.address.clone();
        let capabilities: Vec<String> = node.capabilities.iter().cloned().collect();
        let pressure = self.memory_pressure();
        let outcome = {
            let mut topology = write(&self.topology);
            let outcome = topology.add_agent(node, pressure)?;
            self.publish_neighbors(&topology);
            outcome
        };
        self.gossip.add_peer(&agent_id, &address, &capabilities);
        Ok(outcome)
    }

    pub fn remove_agent(&self, agent_id: &AgentId) -> HiveResult<AgentNode> {
        self.ensure_running()?;
        if *agent_id == self.agent_id {
            return Err(HiveError::ConfigError(
                "the local agent cannot be removed from its own topology".into(),
            ));
        }
        let pressure = self.memory_pressure();
        let removed = {
            let mut topology = write(&self.topology);
            let (removed, _) = topology.remove_agent(agent_id, pressure)?;
            self.publish_neighbors(&topology);
            removed
        };
        self.gossip.remove_peer(agent_id);
        self.last_sent.remove(agent_id);
        Ok(removed)
    }

    /// Re-run the topology decision rule. `None` without quorum.
    pub fn optimize_topology(&self) -> Option<OptimizationOutcome> {
        if !self.gossip.has_quorum() {
            debug!(
                active = self.gossip.peers().active_count(),
                required = self.gossip.min_quorum(),
                "topology optimization skipped without quorum"
            );
            return None;
        }
        let pressure = self.memory_pressure();
        let mut topology = write(&self.topology);
        let _span = topology_span!("periodic", topology.topology().node_count()).entered();
        let outcome = topology.optimize(pressure);
        self.publish_neighbors(&topology);
        Some(outcome)
    }

    pub fn has_quorum(&self) -> bool {
        self.gossip.has_quorum()
    }

    /// Rejected without effect outside (0, 1].
    pub fn set_quorum_threshold(&self, threshold: f64) -> HiveResult<()> {
        self.gossip.set_quorum_threshold(threshold)
    }

    // --- Context propagation ---

    /// Write `update` locally, then send it to the most relevant known
    /// agents as single-operation deltas, reduced for the less relevant.
    pub async fn propagate_context(
        &self,
        update: ContextUpdate,
        options: PropagationOptions,
    ) -> HiveResult<PropagationReport> {
        let write_options = WriteOptions {
            namespace: options.namespace.clone(),
            ttl_secs: None,
            priority: options.priority,
        };
        let entry = self.write_local(update.key.clone(), write_options, |_| {
            Ok(Some(MemoryValue::Opaque(update.value.clone())))
        })?;

        let mut scored: Vec<(AgentId, f64)> = {
            let topology = read(&self.topology);
            let topology = topology.topology();
            topology
                .nodes()
                .filter(|node| node.agent_id != self.agent_id)
                .map(|node| {
                    let connection = topology.connection(&self.agent_id, &node.agent_id);
                    (node.agent_id.clone(), context::relevance(&update, node, connection))
                })
                .collect()
        };
        let considered = scored.len();
        scored.retain(|(_, score)| *score >= options.relevance_threshold);
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(options.max_targets);

        // One entry is not our whole state, so the deltas claim no version.
        // A reduced copy is stamped just below the entry so the full write
        // still replaces it on the next sync.
        let mut reduced = 0;
        let mut outgoing = Vec::with_capacity(scored.len());
        for (target, score) in &scored {
            let (value, is_reduced) = context::personalize(&update, *score);
            let clock = if is_reduced {
                entry.clock.decremented(self.agent_id.as_str())
            } else {
                entry.clock.clone()
            };
            let operation = MemoryOperation {
                key: entry.key.clone(),
                kind: OperationKind::Set { value },
                clock,
                timestamp: entry.timestamp,
                metadata: entry.metadata.clone(),
            };
            let mut delta = MemoryDelta::seal(
                self.agent_id.clone(),
                vec![target.clone()],
                &VectorClock::new(),
                &[operation],
                Vec::new(),
                self.compressor.as_ref(),
            )?;
            if is_reduced {
                delta = delta.into_personalized();
                reduced += 1;
            }
            outgoing.push((target.clone(), Arc::new(delta)));
        }

        let priority = options.priority;
        let sends = outgoing.into_iter().map(|(target, delta)| async move {
            self.gossip
                .send_direct(&target, GossipPayload::Update { delta }, priority)
                .await
        });
        let delivered = join_all(sends).await.into_iter().filter(|ok| *ok).count();

        info!(
            key = %update.key,
            considered,
            targets = scored.len(),
            delivered,
            reduced,
            "context propagated"
        );
        Ok(PropagationReport {
            considered,
            targets: scored,
            delivered,
            reduced,
        })
    }

    // --- Periodic work ---

    /// One sync cycle: release stale held deltas, then send each active
    /// topology neighbor whatever its last reported clock does not cover.
    /// Failed sends are counted and left for the next cycle.
    pub async fn run_sync_cycle(&self) {
        if self.is_shut_down() || self.is_sync_stopped() {
            return;
        }
        let released = self.release_buffered(Instant::now());
        if released > 0 {
            debug!(released, "held deltas released");
        }
        let peers: Vec<PeerState> = self
            .gossip
            .peers()
            .active()
            .into_iter()
            .filter(|peer| self.gossip.is_neighbor(&peer.agent_id))
            .collect();
        join_all(peers.iter().map(|peer| self.sync_peer(peer))).await;
    }

    async fn sync_peer(&self, peer: &PeerState) {
        let local = self.clock();
        if let Some(previous) = self.last_sent.get(&peer.agent_id) {
            if previous.1 == local {
                return;
            }
        }
        let (delta, sealed_at) = match self.build_delta(&peer.agent_id, &peer.clock) {
            Ok(Some(built)) => built,
            Ok(None) => return,
            Err(e) => {
                warn!(peer = %peer.agent_id, error = %e, "delta could not be built");
                self.metrics.sync.record_failure();
                return;
            }
        };
        let delta_id = delta.delta_id.clone();
        let started = Instant::now();
        let delivered = self
            .gossip
            .send_direct(
                &peer.agent_id,
                GossipPayload::Update {
                    delta: Arc::new(delta),
                },
                Priority::Medium,
            )
            .await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        if delivered {
            self.last_sent.insert(peer.agent_id.clone(), (delta_id, sealed_at));
        } else {
            debug!(peer = %peer.agent_id, "sync send failed, retrying next cycle");
            self.metrics.sync.record_failure();
        }
        write(&self.topology).topology_mut().record_round_trip(
            &self.agent_id,
            &peer.agent_id,
            latency_ms,
            delivered,
            self.config.gossip.reliability_alpha,
            Utc::now(),
        );
    }

    /// Purge expired entries and log a metrics snapshot.
    pub fn run_maintenance(&self) -> usize {
        let purged = write(&self.store).purge_expired(Utc::now());
        let snapshot = self.metrics.snapshot();
        info!(
            agent_id = %self.agent_id,
            entries = self.len(),
            purged,
            buffered = lock(&self.buffer).len(),
            messages_sent = snapshot.gossip.messages_sent,
            messages_received = snapshot.gossip.messages_received,
            successful_syncs = snapshot.sync.successful_syncs,
            failed_syncs = snapshot.sync.failed_syncs,
            conflicts = snapshot.sync.conflicts_resolved,
            "memory metrics"
        );
        purged
    }

    pub fn buffered_len(&self) -> usize {
        lock(&self.buffer).len()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn conflict_stats(&self) -> ResolverStats {
        lock(&self.resolver).stats()
    }

    pub fn conflict_history(&self) -> Vec<ResolvedConflict> {
        lock(&self.resolver).history().cloned().collect()
    }

    // --- Emergency cleanup ---

    /// Stop synchronization, keep only critical entries, and reset metrics
    /// and conflict history. Destructive; nothing calls it implicitly.
    pub fn emergency_cleanup(&self) -> CleanupReport {
        self.sync_stopped.store(true, Ordering::SeqCst);
        let (removed, retained) = {
            let mut store = write(&self.store);
            let removed = store.retain(|e| e.metadata.priority == Priority::Critical);
            (removed, store.total_len())
        };
        let dropped_buffered = {
            let mut buffer = lock(&self.buffer);
            let held = buffer.len();
            buffer.clear();
            held
        };
        self.last_sent.clear();
        self.metrics.reset();
        lock(&self.resolver).reset();
        warn!(
            agent_id = %self.agent_id,
            removed,
            retained,
            dropped_buffered,
            "emergency cleanup: synchronization stopped"
        );
        CleanupReport {
            removed,
            retained,
            dropped_buffered,
        }
    }

    pub fn resume_sync(&self) {
        if self.sync_stopped.swap(false, Ordering::SeqCst) {
            info!(agent_id = %self.agent_id, "synchronization resumed");
        }
    }

    pub fn is_sync_stopped(&self) -> bool {
        self.sync_stopped.load(Ordering::SeqCst)
    }

    // --- Lifecycle ---

    /// Spawn the gossip loops, the event handler, and the periodic sync,
    /// optimization, and maintenance tasks. Calling it again is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.is_shut_down() || self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.gossip.start();

        let events = {
            let this = Arc::clone(self);
            let mut receiver = self.gossip.subscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = this.cancel.cancelled() => break,
                        event = receiver.recv() => match event {
                            Ok(event) => this.handle_event(event).await,
                            Err(broadcast::error::RecvError::Lagged(missed)) => {
                                warn!(missed, "gossip events lagged; peers will resync");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        },
                    }
                }
            })
        };
        let sync = self.spawn_periodic(self.config.gossip.sync_interval(), |this| async move {
            this.run_sync_cycle().await;
        });
        let optimize = self.spawn_periodic(self.config.topology.optimization_interval(), |this| async move {
            this.optimize_topology();
        });
        let maintenance = self.spawn_periodic(self.config.sync.metrics_interval(), |this| async move {
            this.run_maintenance();
        });
        lock(&self.tasks).extend([events, sync, optimize, maintenance]);
        info!(agent_id = %self.agent_id, "memory manager started");
    }

    /// Feed frames from a transport inbox into the gossip protocol until
    /// shutdown or until the inbox closes.
    pub fn listen(self: &Arc<Self>, mut inbox: mpsc::UnboundedReceiver<Vec<u8>>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = this.cancel.cancelled() => break,
                    frame = inbox.recv() => match frame {
                        Some(frame) => {
                            this.gossip.receive_frame(&frame);
                        }
                        None => break,
                    },
                }
            }
        });
        lock(&self.tasks).push(handle);
    }

    /// Stop every task, send farewells without waiting, and release peer
    /// state. Later writes fail with [`HiveError::ShutDown`].
    pub fn shutdown(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        self.gossip.shutdown();
        lock(&self.buffer).clear();
        self.last_sent.clear();
        lock(&self.tasks).clear();
        info!(agent_id = %self.agent_id, "memory manager shut down");
    }

    fn spawn_periodic<F, Fut>(self: &Arc<Self>, period: Duration, work: F) -> JoinHandle<()>
    where
        F: Fn(Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = this.cancel.cancelled() => break,
                    _ = ticker.tick() => work(Arc::clone(&this)).await,
                }
            }
        })
    }

    fn ensure_running(&self) -> HiveResult<()> {
        if self.is_shut_down() {
            Err(HiveError::ShutDown)
        } else {
            Ok(())
        }
    }
}

impl Drop for DistributedMemoryManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Apply one operation against the store. Never fails the delta.
fn apply_operation(
    store: &mut MemoryStore,
    resolver: &ConflictResolver,
    operation: MemoryOperation,
    now: DateTime<Utc>,
) -> OpResult {
    let Some(existing) = store.entry(&operation.key).cloned() else {
        store.put(operation.into_entry());
        return OpResult::Applied;
    };

    match operation.clock.compare(&existing.clock) {
        CausalOrder::Before | CausalOrder::Equal => OpResult::Skipped,
        CausalOrder::After => {
            let combined = match (&operation.kind, &existing.value) {
                (OperationKind::Merge { value }, Some(current)) => current.combine(value),
                _ => None,
            };
            let mut entry = operation.into_entry();
            if combined.is_some() {
                entry.value = combined;
            }
            store.put(entry);
            OpResult::Applied
        }
        CausalOrder::Concurrent => {
            let resolution = match resolver.resolve(&existing, &operation) {
                Ok(resolution) => resolution,
                Err(e) => {
                    warn!(key = %operation.key, error = %e, "operation dropped");
                    return OpResult::Dropped;
                }
            };
            let kind = resolution.kind();
            let clock = existing.clock.merged(&operation.clock);
            let key = operation.key.clone();
            let mut entry = match resolution {
                Resolution::KeepExisting => existing,
                Resolution::TakeIncoming => operation.into_entry(),
                Resolution::Merged(value) => {
                    // Metadata and timestamp follow the last writer so every
                    // replica stores the same merged entry.
                    let mut base = if incoming_wins_lww(&existing, &operation) {
                        operation.into_entry()
                    } else {
                        existing
                    };
                    base.value = Some(value);
                    base
                }
            };
            entry.clock = clock;
            let winner = entry.metadata.source_agent.clone();
            store.put(entry);
            OpResult::Resolved(ResolvedConflict {
                key,
                kind,
                winner,
                resolved_at: now,
            })
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
