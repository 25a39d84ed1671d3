//! Envelope codec.
//!
//! Envelopes are plain JSON documents, one per transport message. The
//! transport already delimits messages, so there is no length prefix.
//!
//! ```rust
//! use natsrpc_protocol::{RequestEnvelope, decode, encode};
//!
//! let request = RequestEnvelope::post("/api/login").with_body(b"{}".to_vec());
//! let bytes = encode(&request).unwrap();
//! let decoded: RequestEnvelope = decode(&bytes).unwrap();
//! assert_eq!(decoded, request);
//! ```

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{ProtocolError, ProtocolResult};
use crate::types::{RequestEnvelope, ResponseEnvelope};

/// An envelope that can travel on the wire.
pub trait WireEnvelope: Serialize + DeserializeOwned {
    /// Checks invariants serde cannot express.
    fn validate(&self) -> ProtocolResult<()> {
        Ok(())
    }
}

impl WireEnvelope for RequestEnvelope {
    fn validate(&self) -> ProtocolResult<()> {
        if self.header.mode.is_empty() {
            return Err(ProtocolError::MissingField("mode"));
        }
        if self.header.path.is_empty() {
            return Err(ProtocolError::MissingField("path"));
        }
        Ok(())
    }
}

impl WireEnvelope for ResponseEnvelope {}

/// Serializes an envelope.
pub fn encode<E: WireEnvelope>(envelope: &E) -> ProtocolResult<Vec<u8>> {
    serde_json::to_vec(envelope).map_err(ProtocolError::Encode)
}

/// Deserializes and validates an envelope.
///
/// Unknown fields are ignored and absent optional fields take their defaults.
pub fn decode<E: WireEnvelope>(data: &[u8]) -> ProtocolResult<E> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    let envelope: E = serde_json::from_slice(data).map_err(ProtocolError::Decode)?;
    envelope.validate()?;
    Ok(envelope)
}

/// Encoded size of an envelope in bytes.
pub fn encoded_len<E: WireEnvelope>(envelope: &E) -> ProtocolResult<usize> {
    encode(envelope).map(|bytes| bytes.len())
}
