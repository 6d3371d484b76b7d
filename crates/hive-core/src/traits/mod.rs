pub mod compressor;
pub mod quarantine;
pub mod transport;

pub use compressor::{CompressedPayload, Compressor};
pub use quarantine::{NoQuarantine, QuarantineOracle};
pub use transport::Transport;
