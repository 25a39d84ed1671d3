//! Chunk transfer policy.
//!
//! When an encoded response does not fit in one transport message the
//! responder replies with a 422 signal carrying the chunk count, and the
//! caller fetches each part with a follow-up request whose flags are
//! [`Flags::Chunk`](crate::Flags::Chunk). Follow-up replies carry a slice of
//! the response bytes, base64 encoded, so a slice never has to end on a
//! UTF-8 boundary and its encoded size is known up front.
//!
//! ```text
//! caller                         responder
//!   | req {flags: F}                 |
//!   |------------------------------->|  response too big
//!   |   422 {chunks: N, total_size}  |
//!   |<-------------------------------|
//!   | req {flags: F + chunk_index i} |  for i in 0..N
//!   |------------------------------->|
//!   |   200 {chunks: N} base64(part) |
//!   |<-------------------------------|
//! ```

use std::ops::Range;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::codec::encoded_len;
use crate::error::{ProtocolError, ProtocolResult};
use crate::types::{ResponseEnvelope, ResponseHeader, status};

/// Minimum bytes of every chunk reply reserved for the envelope around the
/// data. Larger headers reserve their encoded size instead.
pub const ENVELOPE_HEADROOM: usize = 512;

/// A chunked transfer always has at least this many parts.
pub const MIN_CHUNKS: u32 = 2;

/// How a response of `total_size` bytes is split for a given payload limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    total_size: usize,
    chunk_size: usize,
    chunks: u32,
}

impl ChunkPlan {
    /// Plans a transfer of `total_size` response bytes under `max_payload`,
    /// assuming the reply header fits in [`ENVELOPE_HEADROOM`].
    pub fn new(total_size: usize, max_payload: usize) -> Self {
        Self::with_capacity(total_size, Self::chunk_capacity(max_payload))
    }

    /// Plans the transfer of `full`, reserving room for the header every
    /// chunk reply repeats.
    pub fn for_response(full: &ResponseEnvelope, max_payload: usize) -> ProtocolResult<Self> {
        let total_size = full.response.len();
        let bare = ResponseEnvelope {
            header: Self::chunk_header(&full.header, u32::MAX, total_size),
            response: String::new(),
        };
        let header = encoded_len(&bare)?;
        let room = max_payload.saturating_sub(header.max(ENVELOPE_HEADROOM));
        if room < 4 {
            return Err(ProtocolError::HeaderTooLarge {
                header,
                max_payload,
            });
        }
        Ok(Self::with_capacity(total_size, room / 4 * 3))
    }

    fn with_capacity(total_size: usize, chunk_size: usize) -> Self {
        let chunks = u32::try_from(total_size.div_ceil(chunk_size))
            .unwrap_or(u32::MAX)
            .max(MIN_CHUNKS);
        Self {
            total_size,
            chunk_size,
            chunks,
        }
    }

    fn chunk_header(header: &ResponseHeader, chunks: u32, total_size: usize) -> ResponseHeader {
        ResponseHeader {
            status: status::OK,
            error_str: None,
            chunks,
            total_size: Some(total_size as u64),
            ..header.clone()
        }
    }

    /// Raw bytes that fit in one chunk reply once base64 encoded.
    pub fn chunk_capacity(max_payload: usize) -> usize {
        (max_payload.saturating_sub(ENVELOPE_HEADROOM) / 4 * 3).max(1)
    }

    /// Number of chunks.
    pub fn chunks(&self) -> u32 {
        self.chunks
    }

    /// Raw bytes per chunk (the last one may be shorter or empty).
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Total response bytes.
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Byte range of chunk `index`.
    pub fn range(&self, index: u32) -> ProtocolResult<Range<usize>> {
        if index >= self.chunks {
            return Err(ProtocolError::ChunkOutOfRange {
                index,
                chunks: self.chunks,
            });
        }
        let start = (index as usize)
            .saturating_mul(self.chunk_size)
            .min(self.total_size);
        let end = start.saturating_add(self.chunk_size).min(self.total_size);
        Ok(start..end)
    }

    /// Slice of `data` belonging to chunk `index`.
    pub fn slice<'a>(&self, data: &'a [u8], index: u32) -> ProtocolResult<&'a [u8]> {
        if data.len() != self.total_size {
            return Err(ProtocolError::chunk_mismatch(format!(
                "planned {} bytes, got {}",
                self.total_size,
                data.len()
            )));
        }
        Ok(&data[self.range(index)?])
    }

    /// The 422 reply announcing this transfer.
    pub fn signal(&self) -> ResponseEnvelope {
        ResponseEnvelope::payload_too_large(self.chunks, self.total_size as u64)
    }

    /// Reply for chunk `index` of `full`, keeping the handler's metadata.
    pub fn chunk_reply(&self, full: &ResponseEnvelope, index: u32) -> ProtocolResult<ResponseEnvelope> {
        let part = self.slice(full.response.as_bytes(), index)?;
        Ok(ResponseEnvelope {
            header: Self::chunk_header(&full.header, self.chunks, self.total_size),
            response: encode_chunk(part),
        })
    }
}

/// Encodes chunk bytes for the `response` field.
pub fn encode_chunk(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes the `response` field of a chunk reply.
pub fn decode_chunk(encoded: &str) -> ProtocolResult<Vec<u8>> {
    Ok(STANDARD.decode(encoded.as_bytes())?)
}

/// Collects chunk replies in index order and rebuilds the full response.
#[derive(Debug)]
pub struct Reassembler {
    chunks: u32,
    total_size: Option<u64>,
    next: u32,
    buffer: Vec<u8>,
    header: Option<ResponseHeader>,
}

impl Reassembler {
    /// Starts from the 422 signal.
    pub fn from_signal(signal: &ResponseEnvelope) -> ProtocolResult<Self> {
        if !signal.is_chunked() {
            return Err(ProtocolError::chunk_mismatch(format!(
                "status {} with {} chunks is not a chunk signal",
                signal.header.status, signal.header.chunks
            )));
        }
        let capacity = signal
            .header
            .total_size
            .and_then(|size| usize::try_from(size).ok())
            .unwrap_or_default();
        Ok(Self {
            chunks: signal.header.chunks,
            total_size: signal.header.total_size,
            next: 0,
            buffer: Vec::with_capacity(capacity),
            header: None,
        })
    }

    /// Number of chunks announced.
    pub fn chunks(&self) -> u32 {
        self.chunks
    }

    /// Index of the next chunk to push, or `None` when all arrived.
    pub fn next_index(&self) -> Option<u32> {
        (self.next < self.chunks).then_some(self.next)
    }

    /// Appends the reply for the next chunk.
    pub fn push(&mut self, reply: &ResponseEnvelope) -> ProtocolResult<()> {
        let Some(index) = self.next_index() else {
            return Err(ProtocolError::ChunkOutOfRange {
                index: self.next,
                chunks: self.chunks,
            });
        };
        if reply.header.chunks != self.chunks {
            return Err(ProtocolError::chunk_mismatch(format!(
                "chunk {} reports {} chunks, expected {}",
                index, reply.header.chunks, self.chunks
            )));
        }
        if reply.header.total_size != self.total_size {
            return Err(ProtocolError::chunk_mismatch(format!(
                "chunk {} reports total size {:?}, expected {:?}",
                index, reply.header.total_size, self.total_size
            )));
        }

        let part = decode_chunk(&reply.response)?;
        self.buffer.extend_from_slice(&part);
        if self.header.is_none() {
            self.header = Some(reply.header.clone());
        }
        self.next += 1;
        Ok(())
    }

    /// Returns the rebuilt response once every chunk arrived.
    ///
    /// The header is the first chunk's header with chunking fields cleared.
    pub fn finish(self) -> ProtocolResult<ResponseEnvelope> {
        if self.next != self.chunks {
            return Err(ProtocolError::chunk_mismatch(format!(
                "received {} of {} chunks",
                self.next, self.chunks
            )));
        }
        if let Some(expected) = self.total_size
            && expected != self.buffer.len() as u64
        {
            return Err(ProtocolError::chunk_mismatch(format!(
                "reassembled {} bytes, expected {}",
                self.buffer.len(),
                expected
            )));
        }

        let response = String::from_utf8(self.buffer)
            .map_err(|e| ProtocolError::chunk_mismatch(format!("response is not UTF-8: {}", e)))?;
        let mut header = self.header.unwrap_or_else(ResponseHeader::ok);
        header.chunks = 0;
        header.total_size = None;
        Ok(ResponseEnvelope { header, response })
    }
}
