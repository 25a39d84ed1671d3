//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding, decoding or reassembling envelopes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The envelope could not be serialized.
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    /// The input is not a well-formed envelope.
    #[error("failed to decode envelope: {0}")]
    Decode(#[source] serde_json::Error),

    /// Zero-length input.
    #[error("empty message")]
    EmptyMessage,

    /// A mandatory header field is absent or empty.
    #[error("missing mandatory header field `{0}`")]
    MissingField(&'static str),

    /// A request or response body did not match the shape the route expects.
    #[error("invalid body: {0}")]
    InvalidBody(#[source] serde_json::Error),

    /// Chunk index outside `0..chunks`.
    #[error("chunk {index} out of range (chunks: {chunks})")]
    ChunkOutOfRange { index: u32, chunks: u32 },

    /// Chunk payload is not valid base64.
    #[error("invalid chunk data: {0}")]
    ChunkData(#[from] base64::DecodeError),

    /// The response header alone leaves no room for chunk data.
    #[error("response header needs {header} bytes, max payload is {max_payload}")]
    HeaderTooLarge { header: usize, max_payload: usize },

    /// Reassembled chunks disagree with the advertised transfer.
    #[error("chunk reassembly mismatch: {reason}")]
    ChunkMismatch { reason: String },
}

impl ProtocolError {
    /// Creates a chunk mismatch error.
    pub fn chunk_mismatch(reason: impl Into<String>) -> Self {
        Self::ChunkMismatch {
            reason: reason.into(),
        }
    }
}
