//! Request/response envelopes for RPC over a publish/subscribe transport.
//!
//! # Envelope Structure
//!
//! A request carries a routing header and an opaque body:
//!
//! ```text
//! { "header": { "mode", "path", "flags"?, "authorization"?, "accept"? }, "body": <base64> }
//! ```
//!
//! A response carries an HTTP-style status and a string result:
//!
//! ```text
//! { "header": { "status", "error_str"?, "chunks"?, ...metadata }, "response": "..." }
//! ```
//!
//! `status != 200` is an application result, not a transport failure.
//! Entity and document update notifications ([`EntityUpdate`],
//! [`DataUpdate`]) share the same codec.
//! A 422 with `chunks > 0` means the result was too large for one message;
//! see [`chunk`] for how the parts are fetched.
//!
//! # Example
//!
//! ```rust
//! use natsrpc_protocol::{Flags, RequestEnvelope, decode, encode};
//!
//! let request = RequestEnvelope::post("/relation/register")
//!     .with_flags(Flags::relation("device-7"))
//!     .with_authorization("abc123");
//! let bytes = encode(&request).unwrap();
//! let decoded: RequestEnvelope = decode(&bytes).unwrap();
//! assert_eq!(decoded.header.flags.identity(), Some("device-7"));
//! ```

pub mod chunk;
mod codec;
mod error;
mod types;
mod update;
mod wire;

pub use chunk::{ChunkPlan, Reassembler};
pub use codec::{WireEnvelope, decode, encode, encoded_len};
pub use error::{ProtocolError, ProtocolResult};
pub use types::{
    CHUNKED_SENTINEL, ChunkFlags, Flags, MAX_PAYLOAD_EXCEEDED, RelationFlags, RequestEnvelope,
    RequestHeader, ResponseEnvelope, ResponseHeader, status,
};
pub use update::{DataUpdate, DataUpdateHeader, EntityUpdate, EntityUpdateHeader};

/// Login route.
pub const LOGIN_PATH: &str = "/api/login";

/// Relation registration route.
pub const RELATION_REGISTER_PATH: &str = "/relation/register";
