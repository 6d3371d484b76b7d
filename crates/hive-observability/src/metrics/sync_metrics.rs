//! Delta synchronization counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct SyncMetrics {
    successful_syncs: AtomicU64,
    failed_syncs: AtomicU64,
    operations_applied: AtomicU64,
    operations_dropped: AtomicU64,
    conflicts_resolved: AtomicU64,
    deltas_buffered: AtomicU64,
    bytes_sent: AtomicU64,
    /// `f64` bit pattern of the most recent compression ratio.
    last_compression_ratio: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncSnapshot {
    pub successful_syncs: u64,
    pub failed_syncs: u64,
    pub operations_applied: u64,
    pub operations_dropped: u64,
    pub conflicts_resolved: u64,
    pub deltas_buffered: u64,
    pub bytes_sent: u64,
    pub last_compression_ratio: f64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self) {
        self.successful_syncs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed_syncs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_applied(&self, operations: u64, conflicts: u64) {
        self.operations_applied.fetch_add(operations, Ordering::Relaxed);
        self.conflicts_resolved.fetch_add(conflicts, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, operations: u64) {
        self.operations_dropped.fetch_add(operations, Ordering::Relaxed);
    }

    pub fn record_buffered(&self) {
        self.deltas_buffered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an outgoing delta of `bytes` compressed at `ratio`.
    pub fn record_sent(&self, bytes: u64, ratio: f64) {
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
        self.last_compression_ratio
            .store(ratio.to_bits(), Ordering::Relaxed);
    }

    pub fn failed_syncs(&self) -> u64 {
        self.failed_syncs.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            successful_syncs: self.successful_syncs.load(Ordering::Relaxed),
            failed_syncs: self.failed_syncs.load(Ordering::Relaxed),
            operations_applied: self.operations_applied.load(Ordering::Relaxed),
            operations_dropped: self.operations_dropped.load(Ordering::Relaxed),
            conflicts_resolved: self.conflicts_resolved.load(Ordering::Relaxed),
            deltas_buffered: self.deltas_buffered.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            last_compression_ratio: f64::from_bits(self.last_compression_ratio.load(Ordering::Relaxed)),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.successful_syncs,
            &self.failed_syncs,
            &self.operations_applied,
            &self.operations_dropped,
            &self.conflicts_resolved,
            &self.deltas_buffered,
            &self.bytes_sent,
            &self.last_compression_ratio,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
