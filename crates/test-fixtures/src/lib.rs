//! Shared fixtures for hive integration tests.
//!
//! Node builders, in-memory transports, and a shard coordinator that
//! records what it was asked to do.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use hive_core::constants::ALGORITHM_NONE;
use hive_core::errors::{IntegrityError, TransportError};
use hive_core::models::{AgentId, ShardId};
use hive_core::traits::{CompressedPayload, Compressor, Transport};
use hive_core::HiveConfig;
use hive_topology::{AgentNode, ShardCoordinator};

/// Test config with short intervals.
pub fn fast_config() -> HiveConfig {
    HiveConfig::from_toml(include_str!("../fixtures/hive.toml"))
        .unwrap_or_else(|e| panic!("fixtures/hive.toml is invalid: {e}"))
}

/// Address convention used by every fixture: `mem://<agent id>`.
pub fn address_of(agent_id: &str) -> String {
    format!("mem://{agent_id}")
}

pub fn node(agent_id: &str) -> AgentNode {
    AgentNode::new(agent_id, address_of(agent_id))
}

pub fn node_with(agent_id: &str, capabilities: &[&str], trust: f64) -> AgentNode {
    node(agent_id)
        .with_capabilities(capabilities.iter().copied())
        .with_trust(trust)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Pass-through codec for tests that exercise sealing, not compression.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityCompressor;

impl Compressor for IdentityCompressor {
    fn algorithm(&self) -> &str {
        ALGORITHM_NONE
    }

    fn compress(&self, bytes: &[u8]) -> Result<CompressedPayload, IntegrityError> {
        Ok(CompressedPayload {
            data: bytes.to_vec(),
            ratio: 1.0,
            algorithm: ALGORITHM_NONE.to_string(),
            original_size: bytes.len(),
        })
    }

    fn decompress(&self, data: &[u8], _algorithm: &str, _original_size: usize) -> Result<Vec<u8>, IntegrityError> {
        Ok(data.to_vec())
    }
}

/// Captures every frame instead of delivering it.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    frames: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All captured `(address, frame)` pairs, oldest first.
    pub fn sent(&self) -> Vec<(String, Vec<u8>)> {
        lock(&self.frames).clone()
    }

    /// Drain captured frames.
    pub fn take(&self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut *lock(&self.frames))
    }

    pub fn frames_to(&self, address: &str) -> Vec<Vec<u8>> {
        lock(&self.frames)
            .iter()
            .filter(|(a, _)| a == address)
            .map(|(_, f)| f.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        lock(&self.frames).len()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, target_address: &str, frame: Vec<u8>) -> Result<(), TransportError> {
        lock(&self.frames).push((target_address.to_string(), frame));
        Ok(())
    }
}

/// Every send fails as unreachable.
#[derive(Debug, Default)]
pub struct FailingTransport;

#[async_trait]
impl Transport for FailingTransport {
    async fn send(&self, target_address: &str, _frame: Vec<u8>) -> Result<(), TransportError> {
        Err(TransportError::Unreachable {
            target: target_address.to_string(),
            reason: "failing transport".to_string(),
        })
    }
}

/// Routes frames between registered in-process inboxes.
///
/// Addresses can be cut off with [`LoopbackNetwork::partition`] to simulate
/// crashed or unreachable agents. Single directed links can be cut with
/// [`LoopbackNetwork::cut`]; that only affects frames sent through an
/// [`LoopbackNetwork::endpoint`], which knows its sender.
#[derive(Debug, Default)]
pub struct LoopbackNetwork {
    inboxes: Mutex<HashMap<String, mpsc::UnboundedSender<Vec<u8>>>>,
    partitioned: Mutex<Vec<String>>,
    cut_links: Mutex<Vec<(String, String)>>,
}

impl LoopbackNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register an inbox for `address`, replacing any previous one.
    pub fn register(&self, address: &str) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.inboxes).insert(address.to_string(), tx);
        rx
    }

    /// A transport that sends as `address`.
    pub fn endpoint(self: &Arc<Self>, address: &str) -> Arc<LoopbackEndpoint> {
        Arc::new(LoopbackEndpoint {
            network: Arc::clone(self),
            address: address.to_string(),
        })
    }

    pub fn partition(&self, address: &str) {
        lock(&self.partitioned).push(address.to_string());
    }

    pub fn heal(&self, address: &str) {
        lock(&self.partitioned).retain(|a| a != address);
    }

    /// Drop frames from `from` to `to`. The reverse direction still works.
    pub fn cut(&self, from: &str, to: &str) {
        lock(&self.cut_links).push((from.to_string(), to.to_string()));
    }

    pub fn mend(&self, from: &str, to: &str) {
        lock(&self.cut_links).retain(|(f, t)| f != from || t != to);
    }

    fn route(&self, from: Option<&str>, target_address: &str, frame: Vec<u8>) -> Result<(), TransportError> {
        let unreachable = |reason: &str| TransportError::Unreachable {
            target: target_address.to_string(),
            reason: reason.to_string(),
        };
        if lock(&self.partitioned).iter().any(|a| a == target_address) {
            return Err(unreachable("partitioned"));
        }
        if let Some(from) = from {
            if lock(&self.cut_links)
                .iter()
                .any(|(f, t)| f == from && t == target_address)
            {
                return Err(unreachable("link cut"));
            }
        }
        let inboxes = lock(&self.inboxes);
        let inbox = inboxes
            .get(target_address)
            .ok_or_else(|| unreachable("no inbox registered"))?;
        inbox.send(frame).map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl Transport for LoopbackNetwork {
    async fn send(&self, target_address: &str, frame: Vec<u8>) -> Result<(), TransportError> {
        self.route(None, target_address, frame)
    }
}

/// One agent's handle on a [`LoopbackNetwork`].
#[derive(Debug)]
pub struct LoopbackEndpoint {
    network: Arc<LoopbackNetwork>,
    address: String,
}

#[async_trait]
impl Transport for LoopbackEndpoint {
    async fn send(&self, target_address: &str, frame: Vec<u8>) -> Result<(), TransportError> {
        self.network.route(Some(&self.address), target_address, frame)
    }
}

/// Records rebalance and redistribution requests.
#[derive(Debug, Default)]
pub struct RecordingShardCoordinator {
    rebalances: Mutex<Vec<Vec<AgentId>>>,
    redistributions: Mutex<Vec<(Vec<ShardId>, Vec<AgentId>)>>,
}

impl RecordingShardCoordinator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Node sets passed to each rebalance call.
    pub fn rebalances(&self) -> Vec<Vec<AgentId>> {
        lock(&self.rebalances).clone()
    }

    /// `(orphaned shards, remaining nodes)` per redistribution call.
    pub fn redistributions(&self) -> Vec<(Vec<ShardId>, Vec<AgentId>)> {
        lock(&self.redistributions).clone()
    }
}

impl ShardCoordinator for RecordingShardCoordinator {
    fn rebalance_shards(&self, nodes: &[AgentNode]) {
        lock(&self.rebalances).push(nodes.iter().map(|n| n.agent_id.clone()).collect());
    }

    fn redistribute_shards(&self, shard_ids: &[ShardId], remaining_nodes: &[AgentNode]) {
        lock(&self.redistributions).push((
            shard_ids.to_vec(),
            remaining_nodes.iter().map(|n| n.agent_id.clone()).collect(),
        ));
    }
}
