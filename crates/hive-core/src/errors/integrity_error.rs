/// Integrity failures on a received delta. Always fatal to the whole delta.
#[derive(Debug, thiserror::Error)]
pub enum IntegrityError {
    #[error("checksum mismatch on delta {delta_id}: expected {expected}, computed {actual}")]
    ChecksumMismatch {
        delta_id: String,
        expected: String,
        actual: String,
    },

    #[error("merkle root mismatch on delta {delta_id}: expected {expected}, computed {actual}")]
    MerkleMismatch {
        delta_id: String,
        expected: String,
        actual: String,
    },

    #[error("decompression failed ({algorithm}): {reason}")]
    DecompressionFailed { algorithm: String, reason: String },

    #[error("compression failed ({algorithm}): {reason}")]
    CompressionFailed { algorithm: String, reason: String },

    #[error("unknown compression algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("payload of delta {delta_id} could not be decoded: {reason}")]
    UndecodablePayload { delta_id: String, reason: String },
}
