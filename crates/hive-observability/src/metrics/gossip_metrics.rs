//! Message flow and failure-detection counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct GossipMetrics {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    duplicates: AtomicU64,
    /// Shed by flood control or rejected on receipt.
    dropped: AtomicU64,
    send_failures: AtomicU64,
    rounds: AtomicU64,
    nodes_failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GossipSnapshot {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub duplicates: u64,
    pub dropped: u64,
    pub send_failures: u64,
    pub rounds: u64,
    pub nodes_failed: u64,
}

impl GossipMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&self, count: u64) {
        self.messages_sent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_round(&self) {
        self.rounds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_node_failed(&self) {
        self.nodes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> GossipSnapshot {
        GossipSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            rounds: self.rounds.load(Ordering::Relaxed),
            nodes_failed: self.nodes_failed.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.messages_sent,
            &self.messages_received,
            &self.duplicates,
            &self.dropped,
            &self.send_failures,
            &self.rounds,
            &self.nodes_failed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
