//! # hive-observability
//!
//! Structured tracing with span definitions and metric collectors for the
//! gossip and synchronization layers.

pub mod metrics;
pub mod tracing_setup;

pub use metrics::{GossipMetrics, GossipSnapshot, MetricsCollector, MetricsSnapshot, SyncMetrics, SyncSnapshot};
pub use tracing_setup::init_tracing;
