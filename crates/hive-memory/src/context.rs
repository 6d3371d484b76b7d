//! Context propagation: who should hear about an update, and in how much
//! detail.
//!
//! Relevance of a peer to an update is a weighted sum:
//!
//! | factor | weight | value |
//! |---|---|---|
//! | capability match | 0.4 | fraction of required capabilities the peer has (1.0 if none required) |
//! | trust | 0.3 | the peer's trust level |
//! | latency | 0.3 | `1 / (1 + latency_ms / 100)` over the measured connection, 0.5 if unmeasured |
//!
//! Peers below [`FULL_DETAIL_RELEVANCE`] receive a reduced copy.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use hive_core::constants::FULL_DETAIL_RELEVANCE;
use hive_core::models::{AgentId, Priority};
use hive_crdt::MemoryValue;
use hive_topology::{AgentNode, Connection};

const CAPABILITY_WEIGHT: f64 = 0.4;
const TRUST_WEIGHT: f64 = 0.3;
const LATENCY_WEIGHT: f64 = 0.3;
/// Latency factor for peers we have never measured.
const UNMEASURED_LATENCY_FACTOR: f64 = 0.5;
const REDUCED_STRING_CHARS: usize = 120;
const REDUCED_ARRAY_ITEMS: usize = 16;

/// A piece of context one agent wants others to know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextUpdate {
    pub key: String,
    pub value: Value,
    /// Capabilities a peer needs for this update to be fully relevant.
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    /// Short form sent to peers that get reduced detail.
    #[serde(default)]
    pub summary: Option<String>,
}

impl ContextUpdate {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
            required_capabilities: Vec::new(),
            summary: None,
        }
    }

    pub fn requiring<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationOptions {
    pub priority: Priority,
    /// Peers scoring below this are skipped.
    pub relevance_threshold: f64,
    pub max_targets: usize,
    pub namespace: String,
}

impl Default for PropagationOptions {
    fn default() -> Self {
        Self {
            priority: Priority::Medium,
            relevance_threshold: 0.5,
            max_targets: 5,
            namespace: "context".to_string(),
        }
    }
}

/// What a propagation did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropagationReport {
    /// Known peers that were scored.
    pub considered: usize,
    /// Selected peers with their relevance, most relevant first.
    pub targets: Vec<(AgentId, f64)>,
    /// Sends the transport accepted.
    pub delivered: usize,
    /// Targets that received a reduced copy.
    pub reduced: usize,
}

/// Relevance of `node` to `update`, in [0, 1].
pub fn relevance(update: &ContextUpdate, node: &AgentNode, connection: Option<&Connection>) -> f64 {
    let capability = if update.required_capabilities.is_empty() {
        1.0
    } else {
        let matched = update
            .required_capabilities
            .iter()
            .filter(|c| node.has_capability(c))
            .count();
        matched as f64 / update.required_capabilities.len() as f64
    };
    let latency = match connection {
        Some(c) if c.last_sync.is_some() => 1.0 / (1.0 + c.latency_ms.max(0.0) / 100.0),
        _ => UNMEASURED_LATENCY_FACTOR,
    };
    CAPABILITY_WEIGHT * capability
        + TRUST_WEIGHT * node.trust_level.clamp(0.0, 1.0)
        + LATENCY_WEIGHT * latency
}

/// The value a peer with the given relevance receives, and whether it was
/// reduced.
pub fn personalize(update: &ContextUpdate, relevance: f64) -> (MemoryValue, bool) {
    if relevance >= FULL_DETAIL_RELEVANCE {
        return (MemoryValue::Opaque(update.value.clone()), false);
    }
    let reduced = match &update.summary {
        Some(summary) => serde_json::json!({ "summary": summary }),
        None => reduce(&update.value),
    };
    (MemoryValue::Opaque(reduced), true)
}

/// Top-level scalars survive; nested structure is dropped, long strings
/// and arrays are cut.
fn reduce(value: &Value) -> Value {
    match value {
        Value::Object(fields) => {
            let kept: Map<String, Value> = fields
                .iter()
                .filter(|(_, v)| !v.is_object() && !v.is_array())
                .map(|(k, v)| (k.clone(), truncate(v)))
                .collect();
            Value::Object(kept)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter(|v| !v.is_object() && !v.is_array())
                .take(REDUCED_ARRAY_ITEMS)
                .map(truncate)
                .collect(),
        ),
        other => truncate(other),
    }
}

fn truncate(value: &Value) -> Value {
    match value {
        Value::String(s) if s.chars().count() > REDUCED_STRING_CHARS => {
            Value::String(s.chars().take(REDUCED_STRING_CHARS).collect())
        }
        other => other.clone(),
    }
}
