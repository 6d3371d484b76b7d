use serde::{Deserialize, Serialize};

use crate::errors::IntegrityError;

/// Output of a [`Compressor`]: the bytes plus enough metadata to invert it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedPayload {
    pub data: Vec<u8>,
    /// `compressed / original`; 1.0 for empty input.
    pub ratio: f64,
    pub algorithm: String,
    pub original_size: usize,
}

/// Pluggable byte transform. Only `decompress(compress(x)) == x` is required.
pub trait Compressor: Send + Sync {
    /// Tag recorded in payloads this compressor produces.
    fn algorithm(&self) -> &str;

    fn compress(&self, bytes: &[u8]) -> Result<CompressedPayload, IntegrityError>;

    fn decompress(
        &self,
        data: &[u8],
        algorithm: &str,
        original_size: usize,
    ) -> Result<Vec<u8>, IntegrityError>;
}
