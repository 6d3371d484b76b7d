/// Hive system version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Algorithm tag for payloads stored without compression.
pub const ALGORITHM_NONE: &str = "none";

/// Algorithm tag for zstd-compressed payloads.
pub const ALGORITHM_ZSTD: &str = "zstd";

/// Rumor topic announcing a graceful departure.
pub const RUMOR_NODE_LEAVING: &str = "node_leaving";

/// Relevance below which propagated context is sent with reduced detail.
pub const FULL_DETAIL_RELEVANCE: f64 = 0.7;

/// Maximum number of resolved conflicts retained in resolver history.
pub const MAX_CONFLICT_HISTORY: usize = 256;
