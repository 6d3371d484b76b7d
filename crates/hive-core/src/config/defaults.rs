// Single source of truth for all default values.

// --- Gossip ---
pub const DEFAULT_FANOUT: usize = 3;
pub const DEFAULT_GOSSIP_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_MAX_TTL: u32 = 10;
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_ADAPTIVE_GOSSIP: bool = true;
pub const DEFAULT_MIN_QUORUM_THRESHOLD: f64 = 0.51;
pub const DEFAULT_FAILURE_WINDOW_MULTIPLIER: u32 = 3;
pub const DEFAULT_SEEN_CACHE_TTL_SECS: u64 = 300; // 5 minutes
pub const DEFAULT_SEEN_CACHE_CAPACITY: u64 = 100_000;
pub const DEFAULT_ANTI_ENTROPY_PEERS: usize = 3;
pub const DEFAULT_INITIAL_RELIABILITY: f64 = 0.8;
pub const DEFAULT_RELIABILITY_ALPHA: f64 = 0.2;
pub const DEFAULT_FAILURE_RELIABILITY_PENALTY: f64 = 0.2;
pub const DEFAULT_SEND_FAILURE_PENALTY: f64 = 0.1;
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_MAX_PENDING_MESSAGES: usize = 1_000;

// --- Topology ---
pub const DEFAULT_REPLICATION_FACTOR: usize = 3;
pub const DEFAULT_MESH_NODE_LIMIT: usize = 10;
pub const DEFAULT_MEMORY_PRESSURE_THRESHOLD: f64 = 0.8;
pub const DEFAULT_OPTIMIZATION_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_SHARDING_ENABLED: bool = false;
pub const DEFAULT_SHARD_COUNT: usize = 16;
pub const DEFAULT_VIRTUAL_NODES: usize = 16;

// --- Sync ---
pub const DEFAULT_DISSEMINATION_ENABLED: bool = true;
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;
pub const DEFAULT_APPLIED_DELTA_RETENTION_SECS: u64 = 600;
pub const DEFAULT_MAX_BUFFERED_DELTAS: usize = 1_000;
pub const DEFAULT_DEPENDENCY_WAIT_MS: u64 = 30_000;
pub const DEFAULT_METRICS_INTERVAL_MS: u64 = 60_000;

// --- Observability ---
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_JSON_LOGS: bool = false;
