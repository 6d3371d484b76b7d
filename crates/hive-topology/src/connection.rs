//! Directed edges between agents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hive_core::models::AgentId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub from_agent: AgentId,
    pub to_agent: AgentId,
    /// Smoothed round-trip latency in milliseconds.
    pub latency_ms: f64,
    /// Bytes per second, as last reported by the transport.
    pub bandwidth: f64,
    /// Exponential moving average of round-trip success, in [0, 1].
    pub reliability: f64,
    pub last_sync: Option<DateTime<Utc>>,
}

impl Connection {
    pub fn new(from_agent: AgentId, to_agent: AgentId) -> Self {
        Self {
            from_agent,
            to_agent,
            latency_ms: 0.0,
            bandwidth: 0.0,
            reliability: 1.0,
            last_sync: None,
        }
    }

    /// Fold one round trip into the moving averages.
    ///
    /// `alpha` is the weight of the new sample. Failed round trips only
    /// affect reliability; their latency is meaningless.
    pub fn record_round_trip(&mut self, latency_ms: f64, success: bool, alpha: f64, now: DateTime<Utc>) {
        let alpha = alpha.clamp(0.0, 1.0);
        let sample = if success { 1.0 } else { 0.0 };
        self.reliability = (1.0 - alpha) * self.reliability + alpha * sample;
        if success {
            self.latency_ms = if self.last_sync.is_none() {
                latency_ms
            } else {
                (1.0 - alpha) * self.latency_ms + alpha * latency_ms
            };
            self.last_sync = Some(now);
        }
    }

    /// Key used to index connections: `(from, to)`.
    pub fn key(&self) -> (AgentId, AgentId) {
        (self.from_agent.clone(), self.to_agent.clone())
    }
}
