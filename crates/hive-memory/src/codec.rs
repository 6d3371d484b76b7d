//! zstd payload codec.
//!
//! Payloads that zstd cannot shrink are stored raw under the `none` tag, so
//! tiny single-operation deltas never grow on the wire.

use hive_core::constants::{ALGORITHM_NONE, ALGORITHM_ZSTD};
use hive_core::errors::IntegrityError;
use hive_core::traits::{CompressedPayload, Compressor};

/// Largest decoded payload accepted from a peer.
pub const MAX_DECODED_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct ZstdCompressor {
    level: i32,
}

impl ZstdCompressor {
    pub fn new(level: i32) -> Self {
        Self { level }
    }

    pub fn level(&self) -> i32 {
        self.level
    }
}

impl Default for ZstdCompressor {
    fn default() -> Self {
        Self::new(hive_core::config::defaults::DEFAULT_COMPRESSION_LEVEL)
    }
}

impl Compressor for ZstdCompressor {
    fn algorithm(&self) -> &str {
        ALGORITHM_ZSTD
    }

    fn compress(&self, bytes: &[u8]) -> Result<CompressedPayload, IntegrityError> {
        if bytes.is_empty() {
            return Ok(raw(bytes));
        }
        let data = zstd::encode_all(bytes, self.level).map_err(|e| {
            IntegrityError::CompressionFailed {
                algorithm: ALGORITHM_ZSTD.to_string(),
                reason: e.to_string(),
            }
        })?;
        if data.len() >= bytes.len() {
            return Ok(raw(bytes));
        }
        Ok(CompressedPayload {
            ratio: data.len() as f64 / bytes.len() as f64,
            data,
            algorithm: ALGORITHM_ZSTD.to_string(),
            original_size: bytes.len(),
        })
    }

    fn decompress(
        &self,
        data: &[u8],
        algorithm: &str,
        original_size: usize,
    ) -> Result<Vec<u8>, IntegrityError> {
        if original_size > MAX_DECODED_BYTES {
            return Err(failed(
                algorithm,
                format!("declared size {original_size} exceeds {MAX_DECODED_BYTES} bytes"),
            ));
        }
        let bytes = match algorithm {
            // Output is capped at the declared size; a larger stream fails here.
            ALGORITHM_ZSTD => zstd::bulk::decompress(data, original_size)
                .map_err(|e| failed(algorithm, e.to_string()))?,
            ALGORITHM_NONE => data.to_vec(),
            other => return Err(IntegrityError::UnknownAlgorithm(other.to_string())),
        };
        if bytes.len() != original_size {
            return Err(failed(
                algorithm,
                format!("expected {original_size} bytes, got {}", bytes.len()),
            ));
        }
        Ok(bytes)
    }
}

fn raw(bytes: &[u8]) -> CompressedPayload {
    CompressedPayload {
        data: bytes.to_vec(),
        ratio: 1.0,
        algorithm: ALGORITHM_NONE.to_string(),
        original_size: bytes.len(),
    }
}

fn failed(algorithm: &str, reason: String) -> IntegrityError {
    IntegrityError::DecompressionFailed {
        algorithm: algorithm.to_string(),
        reason,
    }
}
