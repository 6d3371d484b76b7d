mod conflict_error;
mod hive_error;
mod integrity_error;
mod topology_error;
mod transport_error;

pub use conflict_error::ConflictError;
pub use hive_error::{HiveError, HiveResult};
pub use integrity_error::IntegrityError;
pub use topology_error::TopologyError;
pub use transport_error::TransportError;
