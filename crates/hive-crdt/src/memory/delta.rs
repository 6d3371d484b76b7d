//! Sealed delta: the unit of replica-to-replica synchronization.
//!
//! A delta is sealed by the sender (operations serialized, compressed,
//! checksummed, Merkle-rooted) and opened by the receiver, which verifies
//! both integrity hashes before handing back any operation. A delta that
//! fails either check yields nothing, so it can never be partially applied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use hive_core::errors::{HiveResult, IntegrityError};
use hive_core::models::AgentId;
use hive_core::traits::{CompressedPayload, Compressor};

use super::merkle::{checksum, merkle_root};
use super::operation::MemoryOperation;
use crate::clock::VectorClock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryDelta {
    pub delta_id: String,
    pub source_agent: AgentId,
    pub target_agents: Vec<AgentId>,
    /// The source's vector clock at sealing time, in stable string form.
    /// It summarizes what the delta brings its targets, who may adopt it
    /// once the delta is applied. Empty when the delta is a partial send.
    pub version: String,
    pub operation_count: usize,
    /// Merkle root over the operations' content hashes, in order.
    pub merkle_root: String,
    /// Compressed JSON encoding of the operation list.
    pub payload: CompressedPayload,
    /// Checksum over `payload.data`.
    pub checksum: String,
    /// Delta ids the receiver must apply first.
    pub dependencies: Vec<String>,
    /// Tailored to its targets; receivers must not relay it further.
    #[serde(default)]
    pub personalized: bool,
    pub created_at: DateTime<Utc>,
}

impl MemoryDelta {
    /// Package operations into a sealed delta.
    pub fn seal(
        source_agent: AgentId,
        target_agents: Vec<AgentId>,
        version: &VectorClock,
        operations: &[MemoryOperation],
        dependencies: Vec<String>,
        compressor: &dyn Compressor,
    ) -> HiveResult<Self> {
        let leaves: Vec<String> = operations.iter().map(MemoryOperation::content_hash).collect();
        let encoded = serde_json::to_vec(operations)?;
        let payload = compressor.compress(&encoded)?;
        let sum = checksum(&payload.data);

        debug!(
            operations = operations.len(),
            original = payload.original_size,
            compressed = payload.data.len(),
            "sealed delta"
        );

        Ok(Self {
            delta_id: uuid::Uuid::new_v4().to_string(),
            source_agent,
            target_agents,
            version: version.to_stable_string(),
            operation_count: operations.len(),
            merkle_root: merkle_root(&leaves),
            payload,
            checksum: sum,
            dependencies,
            personalized: false,
            created_at: Utc::now(),
        })
    }

    /// Mark the delta as tailored to its targets.
    pub fn into_personalized(mut self) -> Self {
        self.personalized = true;
        self
    }

    /// Check the payload checksum without decompressing.
    pub fn verify_checksum(&self) -> Result<(), IntegrityError> {
        let actual = checksum(&self.payload.data);
        if actual == self.checksum {
            Ok(())
        } else {
            Err(IntegrityError::ChecksumMismatch {
                delta_id: self.delta_id.clone(),
                expected: self.checksum.clone(),
                actual,
            })
        }
    }

    /// Verify, decompress, decode, and Merkle-check the operation list.
    pub fn open(&self, compressor: &dyn Compressor) -> Result<Vec<MemoryOperation>, IntegrityError> {
        self.verify_checksum()?;

        let bytes = compressor.decompress(
            &self.payload.data,
            &self.payload.algorithm,
            self.payload.original_size,
        )?;
        let operations: Vec<MemoryOperation> =
            serde_json::from_slice(&bytes).map_err(|e| IntegrityError::UndecodablePayload {
                delta_id: self.delta_id.clone(),
                reason: e.to_string(),
            })?;

        let leaves: Vec<String> = operations.iter().map(MemoryOperation::content_hash).collect();
        let actual = merkle_root(&leaves);
        if actual != self.merkle_root {
            return Err(IntegrityError::MerkleMismatch {
                delta_id: self.delta_id.clone(),
                expected: self.merkle_root.clone(),
                actual,
            });
        }
        Ok(operations)
    }

    pub fn is_addressed_to(&self, agent_id: &AgentId) -> bool {
        self.target_agents.contains(agent_id)
    }

    /// The sender's clock, decoded from `version`.
    pub fn version_clock(&self) -> HiveResult<VectorClock> {
        VectorClock::parse(&self.version)
    }

    pub fn is_empty(&self) -> bool {
        self.operation_count == 0
    }
}
