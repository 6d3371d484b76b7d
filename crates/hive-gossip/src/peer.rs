//! Peer liveness and link quality.
//!
//! A peer is `Active` or `Inactive`; there is no separate recovering
//! state. Any message heard from a peer makes it `Active` again at once.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use hive_core::models::AgentId;
use hive_crdt::VectorClock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerState {
    pub agent_id: AgentId,
    pub address: String,
    pub capabilities: Vec<String>,
    pub status: PeerStatus,
    /// Missed heartbeat windows plus failed sends since last contact.
    pub failure_count: u32,
    /// In [0, 1].
    pub reliability: f64,
    /// Smoothed send round trip; 0 until first measured.
    pub rtt_ms: f64,
    pub last_seen: DateTime<Utc>,
    /// End of the last heartbeat window already counted as missed.
    pub last_failure_mark: Option<DateTime<Utc>>,
    /// Highest clock the peer reported about itself.
    pub clock: VectorClock,
}

impl PeerState {
    pub fn new(agent_id: AgentId, address: String, reliability: f64, now: DateTime<Utc>) -> Self {
        Self {
            agent_id,
            address,
            capabilities: Vec::new(),
            status: PeerStatus::Active,
            failure_count: 0,
            reliability: reliability.clamp(0.0, 1.0),
            rtt_ms: 0.0,
            last_seen: now,
            last_failure_mark: None,
            clock: VectorClock::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PeerStatus::Active
    }

    /// Contact from this peer. Returns `true` if it was inactive.
    pub fn mark_alive(&mut self, now: DateTime<Utc>) -> bool {
        let recovered = self.status == PeerStatus::Inactive;
        self.status = PeerStatus::Active;
        self.failure_count = 0;
        self.last_failure_mark = None;
        if now > self.last_seen {
            self.last_seen = now;
        }
        recovered
    }

    pub fn record_send_success(&mut self, rtt_ms: f64, alpha: f64) {
        self.reliability = ((1.0 - alpha) * self.reliability + alpha).clamp(0.0, 1.0);
        self.rtt_ms = if self.rtt_ms == 0.0 {
            rtt_ms
        } else {
            (1.0 - alpha) * self.rtt_ms + alpha * rtt_ms
        };
    }

    pub fn record_send_failure(&mut self, penalty: f64) {
        self.reliability = (self.reliability - penalty).max(0.0);
        self.failure_count = self.failure_count.saturating_add(1);
    }

    /// Count heartbeat windows that elapsed since last contact or the last
    /// counted window, whichever is later. Each window is counted once.
    pub fn count_missed_windows(&mut self, now: DateTime<Utc>, window: Duration) -> u32 {
        let window_ms = window.num_milliseconds();
        if window_ms <= 0 {
            return 0;
        }
        let reference = match self.last_failure_mark {
            Some(mark) if mark > self.last_seen => mark,
            _ => self.last_seen,
        };
        let elapsed_ms = (now - reference).num_milliseconds();
        if elapsed_ms < window_ms {
            return 0;
        }
        let missed = elapsed_ms / window_ms;
        self.last_failure_mark = Some(reference + Duration::milliseconds(missed * window_ms));
        let missed = u32::try_from(missed).unwrap_or(u32::MAX);
        self.failure_count = self.failure_count.saturating_add(missed);
        missed
    }

    /// Ranking score: reliability minus round trip normalized to the
    /// slowest candidate.
    pub fn score(&self, max_rtt_ms: f64) -> f64 {
        let normalized = if max_rtt_ms > 0.0 {
            self.rtt_ms / max_rtt_ms
        } else {
            0.0
        };
        self.reliability - normalized
    }
}

/// Concurrent peer table keyed by agent id.
#[derive(Debug)]
pub struct PeerTable {
    peers: DashMap<AgentId, PeerState>,
    initial_reliability: f64,
}

impl PeerTable {
    pub fn new(initial_reliability: f64) -> Self {
        Self {
            peers: DashMap::new(),
            initial_reliability,
        }
    }

    /// Insert a peer or refresh its address and capabilities.
    /// Returns `true` if the peer was not known.
    pub fn upsert(
        &self,
        agent_id: &AgentId,
        address: &str,
        capabilities: &[String],
        now: DateTime<Utc>,
    ) -> bool {
        let mut is_new = false;
        let mut entry = self.peers.entry(agent_id.clone()).or_insert_with(|| {
            is_new = true;
            PeerState::new(
                agent_id.clone(),
                address.to_string(),
                self.initial_reliability,
                now,
            )
        });
        if entry.address != address {
            entry.address = address.to_string();
        }
        if entry.capabilities != capabilities {
            entry.capabilities = capabilities.to_vec();
        }
        is_new
    }

    pub fn remove(&self, agent_id: &AgentId) -> Option<PeerState> {
        self.peers.remove(agent_id).map(|(_, state)| state)
    }

    pub fn get(&self, agent_id: &AgentId) -> Option<PeerState> {
        self.peers.get(agent_id).map(|p| p.clone())
    }

    pub fn contains(&self, agent_id: &AgentId) -> bool {
        self.peers.contains_key(agent_id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.peers.iter().filter(|p| p.is_active()).count()
    }

    /// Copy of every peer, ordered by agent id.
    pub fn snapshot(&self) -> Vec<PeerState> {
        let mut peers: Vec<PeerState> = self.peers.iter().map(|p| p.clone()).collect();
        peers.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        peers
    }

    pub fn active(&self) -> Vec<PeerState> {
        self.snapshot().into_iter().filter(|p| p.is_active()).collect()
    }

    /// `None` if the peer is unknown, otherwise whether it just recovered.
    pub fn mark_alive(&self, agent_id: &AgentId, now: DateTime<Utc>) -> Option<bool> {
        self.peers.get_mut(agent_id).map(|mut p| p.mark_alive(now))
    }

    /// Fold in a clock the peer reported directly.
    pub fn observe_clock(&self, agent_id: &AgentId, clock: &VectorClock) {
        if let Some(mut p) = self.peers.get_mut(agent_id) {
            p.clock.merge(clock);
        }
    }

    pub fn record_send_success(&self, agent_id: &AgentId, rtt_ms: f64, alpha: f64) {
        if let Some(mut p) = self.peers.get_mut(agent_id) {
            p.record_send_success(rtt_ms, alpha);
        }
    }

    pub fn record_send_failure(&self, agent_id: &AgentId, penalty: f64) {
        if let Some(mut p) = self.peers.get_mut(agent_id) {
            p.record_send_failure(penalty);
        }
    }

    /// Active peers not rejected by `exclude`, best score first, at most `limit`.
    pub fn ranked(&self, exclude: impl Fn(&AgentId) -> bool, limit: usize) -> Vec<PeerState> {
        let mut candidates: Vec<PeerState> = self
            .active()
            .into_iter()
            .filter(|p| !exclude(&p.agent_id))
            .collect();
        let max_rtt = candidates.iter().map(|p| p.rtt_ms).fold(0.0, f64::max);
        candidates.sort_by(|a, b| {
            b.score(max_rtt)
                .total_cmp(&a.score(max_rtt))
                .then_with(|| a.agent_id.cmp(&b.agent_id))
        });
        candidates.truncate(limit);
        candidates
    }

    /// Active peers heard from least recently, at most `limit`.
    pub fn stalest(&self, limit: usize) -> Vec<PeerState> {
        let mut active = self.active();
        active.sort_by(|a, b| {
            a.last_seen
                .cmp(&b.last_seen)
                .then_with(|| a.agent_id.cmp(&b.agent_id))
        });
        active.truncate(limit);
        active
    }

    /// Count missed windows for every peer and deactivate those at the
    /// threshold. Returns the newly inactive peers with their reliability.
    pub fn detect_failures(
        &self,
        now: DateTime<Utc>,
        window: Duration,
        threshold: u32,
        penalty: f64,
    ) -> Vec<(AgentId, f64)> {
        let mut failed = Vec::new();
        for mut peer in self.peers.iter_mut() {
            peer.count_missed_windows(now, window);
            if peer.is_active() && peer.failure_count >= threshold {
                peer.status = PeerStatus::Inactive;
                peer.reliability = (peer.reliability - penalty).max(0.0);
                failed.push((peer.agent_id.clone(), peer.reliability));
            }
        }
        failed.sort_by(|a, b| a.0.cmp(&b.0));
        failed
    }

    pub fn clear(&self) {
        self.peers.clear();
    }
}
