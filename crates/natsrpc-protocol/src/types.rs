//! Request and response envelopes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ProtocolError, ProtocolResult};
use crate::wire;

/// HTTP-style status codes carried in [`ResponseHeader::status`].
pub mod status {
    /// Success.
    pub const OK: u16 = 200;
    /// Malformed route parameters or body.
    pub const BAD_REQUEST: u16 = 400;
    /// Missing or rejected bearer token.
    pub const UNAUTHORIZED: u16 = 401;
    /// No route for `(mode, path)`.
    pub const NOT_FOUND: u16 = 404;
    /// Response did not fit in one transport message; fetch it in chunks.
    pub const PAYLOAD_TOO_LARGE: u16 = 422;
    /// Handler failure.
    pub const INTERNAL_ERROR: u16 = 500;
}

/// `error_str` of the oversized-response signal.
pub const MAX_PAYLOAD_EXCEEDED: &str = "max payload exceeded";

/// `response` value of the oversized-response signal.
pub const CHUNKED_SENTINEL: &str = "error";

/// Route parameters carried in [`RequestHeader::flags`].
///
/// On the wire this is always a JSON object; the variant is picked by shape.
/// Objects that match neither typed variant stay in [`Flags::Generic`].
/// Equality compares the wire object, so a generic map holding exactly the
/// keys of a typed variant equals that variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Flags {
    /// `/relation/register` parameters.
    Relation(RelationFlags),
    /// Chunk follow-up request.
    Chunk(ChunkFlags),
    /// Route-agnostic key/value bag.
    Generic(Map<String, Value>),
}

/// Flags of a relation registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationFlags {
    /// Identity the relation is registered for.
    pub identity: String,
}

/// Flags of a chunk follow-up request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkFlags {
    /// Zero-based chunk index.
    pub chunk_index: u32,
    /// Flags of the original request, flattened next to `chunk_index`.
    #[serde(flatten)]
    pub route: Map<String, Value>,
}

impl Default for Flags {
    fn default() -> Self {
        Self::Generic(Map::new())
    }
}

impl PartialEq for Flags {
    fn eq(&self, other: &Self) -> bool {
        self.clone().into_map() == other.clone().into_map()
    }
}

impl Flags {
    /// Relation registration flags.
    pub fn relation(identity: impl Into<String>) -> Self {
        Self::Relation(RelationFlags {
            identity: identity.into(),
        })
    }

    /// Flags from key/value pairs.
    ///
    /// A lone string `identity` key yields [`Flags::Relation`] and a
    /// `chunk_index` number yields [`Flags::Chunk`], as they would after
    /// decoding.
    pub fn generic<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::from_map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Rebuilds typed flags from a raw map.
    pub fn from_map(map: Map<String, Value>) -> Self {
        match serde_json::from_value(Value::Object(map.clone())) {
            Ok(flags) => flags,
            Err(_) => Self::Generic(map),
        }
    }

    /// Flattens the flags into their wire map.
    pub fn into_map(self) -> Map<String, Value> {
        match self {
            Self::Relation(relation) => {
                let mut map = Map::new();
                map.insert("identity".to_string(), Value::String(relation.identity));
                map
            }
            Self::Chunk(chunk) => {
                let mut map = chunk.route;
                map.insert("chunk_index".to_string(), Value::from(chunk.chunk_index));
                map
            }
            Self::Generic(map) => map,
        }
    }

    /// Returns true when the flags serialize to an empty object.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Generic(map) if map.is_empty())
    }

    /// Identity of a relation registration.
    pub fn identity(&self) -> Option<&str> {
        match self {
            Self::Relation(relation) => Some(&relation.identity),
            Self::Generic(map) if map.len() == 1 => map.get("identity").and_then(Value::as_str),
            _ => None,
        }
    }

    /// Index of a chunk follow-up request.
    pub fn chunk_index(&self) -> Option<u32> {
        match self {
            Self::Chunk(chunk) => Some(chunk.chunk_index),
            Self::Generic(map) => map
                .get("chunk_index")
                .and_then(Value::as_u64)
                .and_then(|index| u32::try_from(index).ok()),
            Self::Relation(_) => None,
        }
    }

    /// Looks up a raw value by key.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Self::Relation(relation) if key == "identity" => {
                Some(Value::String(relation.identity.clone()))
            }
            Self::Relation(_) => None,
            Self::Chunk(chunk) if key == "chunk_index" => Some(Value::from(chunk.chunk_index)),
            Self::Chunk(chunk) => chunk.route.get(key).cloned(),
            Self::Generic(map) => map.get(key).cloned(),
        }
    }

    /// Wraps these flags into a chunk follow-up for `index`.
    ///
    /// Chunk flags are re-targeted rather than nested.
    pub fn with_chunk_index(self, index: u32) -> Self {
        let route = match self {
            Self::Chunk(chunk) => chunk.route,
            other => other.into_map(),
        };
        Self::Chunk(ChunkFlags {
            chunk_index: index,
            route,
        })
    }

    /// Splits a chunk follow-up into its index and the original route flags.
    pub fn split_chunk(self) -> (Option<u32>, Self) {
        match self {
            Self::Chunk(chunk) => (Some(chunk.chunk_index), Self::from_map(chunk.route)),
            other => (None, other),
        }
    }
}

/// Request header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestHeader {
    /// Verb-like routing mode, e.g. `"POST"`.
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub mode: String,
    /// Hierarchical resource path.
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub path: String,
    /// Route-specific parameters.
    #[serde(
        default,
        deserialize_with = "wire::null_as_default",
        skip_serializing_if = "Flags::is_empty"
    )]
    pub flags: Flags,
    /// Bearer token; empty before login.
    #[serde(
        default,
        deserialize_with = "wire::null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub authorization: String,
    /// Content negotiation hint.
    #[serde(
        default,
        deserialize_with = "wire::empty_as_none",
        skip_serializing_if = "wire::is_blank"
    )]
    pub accept: Option<String>,
}

impl PartialEq for RequestHeader {
    fn eq(&self, other: &Self) -> bool {
        self.mode == other.mode
            && self.path == other.path
            && self.flags == other.flags
            && self.authorization == other.authorization
            && wire::same_text(&self.accept, &other.accept)
    }
}

impl RequestHeader {
    /// Creates a header with no flags and no token.
    pub fn new(mode: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            mode: mode.into(),
            path: path.into(),
            flags: Flags::default(),
            authorization: String::new(),
            accept: None,
        }
    }
}

/// Request envelope: header plus an opaque body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Routing header.
    pub header: RequestHeader,
    /// Body bytes, interpreted by the route handler only.
    #[serde(default, with = "wire::bytes")]
    pub body: Vec<u8>,
}

impl RequestEnvelope {
    /// Creates a request with an empty body.
    pub fn new(mode: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            header: RequestHeader::new(mode, path),
            body: Vec::new(),
        }
    }

    /// Creates a `POST` request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new("POST", path)
    }

    /// Creates a `GET` request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    /// Builder: set flags.
    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.header.flags = flags;
        self
    }

    /// Builder: set the bearer token.
    pub fn with_authorization(mut self, token: impl Into<String>) -> Self {
        self.header.authorization = token.into();
        self
    }

    /// Builder: set the accept hint.
    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.header.accept = Some(accept.into());
        self
    }

    /// Builder: set raw body bytes.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Builder: set the body to the JSON encoding of `value`.
    pub fn with_json_body<T: Serialize>(mut self, value: &T) -> ProtocolResult<Self> {
        self.body = serde_json::to_vec(value).map_err(ProtocolError::Encode)?;
        Ok(self)
    }

    /// Parses the body as JSON.
    pub fn body_json<T: DeserializeOwned>(&self) -> ProtocolResult<T> {
        serde_json::from_slice(&self.body).map_err(ProtocolError::InvalidBody)
    }

    /// The routing key as `(mode, path)`.
    pub fn route(&self) -> (&str, &str) {
        (&self.header.mode, &self.header.path)
    }
}

/// Response header.
///
/// Field order and wire names follow the services this protocol talks to.
#[derive(Debug, Clone, Default, Eq, Serialize, Deserialize)]
pub struct ResponseHeader {
    /// Route metadata: whether a document was created.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub created: bool,
    /// Route metadata: epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Route metadata: resource path.
    #[serde(
        default,
        deserialize_with = "wire::empty_as_none",
        skip_serializing_if = "wire::is_blank"
    )]
    pub path: Option<String>,
    /// Route metadata: document id.
    #[serde(
        rename = "docId",
        default,
        deserialize_with = "wire::empty_as_none",
        skip_serializing_if = "wire::is_blank"
    )]
    pub doc: Option<String>,
    /// Route metadata: document version.
    #[serde(
        rename = "docVersion",
        default,
        deserialize_with = "wire::empty_as_none",
        skip_serializing_if = "wire::is_blank"
    )]
    pub doc_version: Option<String>,
    /// HTTP-style status.
    pub status: u16,
    /// Diagnostic, present iff `status != 200`.
    #[serde(
        default,
        deserialize_with = "wire::empty_as_none",
        skip_serializing_if = "wire::is_blank"
    )]
    pub error_str: Option<String>,
    /// Id of the responder that produced the reply.
    #[serde(
        rename = "serverID",
        default,
        deserialize_with = "wire::empty_as_none",
        skip_serializing_if = "wire::is_blank"
    )]
    pub server_id: Option<String>,
    /// 0 when the response is inline, otherwise the number of chunks to fetch.
    #[serde(default, skip_serializing_if = "wire::is_zero")]
    pub chunks: u32,
    /// Route metadata: encrypted header blob.
    #[serde(default, with = "wire::opt_bytes", skip_serializing_if = "wire::is_blank_bytes")]
    pub encrypted_hdr: Option<Vec<u8>>,
    /// Byte length of the full response when it is delivered in chunks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_size: Option<u64>,
}

// Unset and empty optional fields are the same header on the wire.
impl PartialEq for ResponseHeader {
    fn eq(&self, other: &Self) -> bool {
        self.created == other.created
            && self.timestamp == other.timestamp
            && wire::same_text(&self.path, &other.path)
            && wire::same_text(&self.doc, &other.doc)
            && wire::same_text(&self.doc_version, &other.doc_version)
            && self.status == other.status
            && wire::same_text(&self.error_str, &other.error_str)
            && wire::same_text(&self.server_id, &other.server_id)
            && self.chunks == other.chunks
            && wire::same_bytes(&self.encrypted_hdr, &other.encrypted_hdr)
            && self.total_size == other.total_size
    }
}

impl ResponseHeader {
    /// Success header.
    pub fn ok() -> Self {
        Self {
            status: status::OK,
            ..Default::default()
        }
    }

    /// Error header with a diagnostic.
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            error_str: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Status and metadata.
    pub header: ResponseHeader,
    /// String-encoded result; [`CHUNKED_SENTINEL`] on a chunk signal.
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub response: String,
}

impl ResponseEnvelope {
    /// Successful response.
    pub fn ok(response: impl Into<String>) -> Self {
        Self {
            header: ResponseHeader::ok(),
            response: response.into(),
        }
    }

    /// Successful response carrying `value` as JSON text.
    pub fn json<T: Serialize>(value: &T) -> ProtocolResult<Self> {
        let response = serde_json::to_string(value).map_err(ProtocolError::Encode)?;
        Ok(Self::ok(response))
    }

    /// Application error.
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            header: ResponseHeader::error(status, message),
            response: String::new(),
        }
    }

    /// No route matched `(mode, path)`.
    pub fn not_found(mode: &str, path: &str) -> Self {
        Self::error(
            status::NOT_FOUND,
            format!("no route for {} {}", mode, path),
        )
    }

    /// Bad request.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::error(status::BAD_REQUEST, message)
    }

    /// Missing or rejected credentials.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::error(status::UNAUTHORIZED, message)
    }

    /// Handler failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::error(status::INTERNAL_ERROR, message)
    }

    /// Oversized-response signal telling the caller to fetch `chunks` parts.
    pub fn payload_too_large(chunks: u32, total_size: u64) -> Self {
        Self {
            header: ResponseHeader {
                status: status::PAYLOAD_TOO_LARGE,
                error_str: Some(MAX_PAYLOAD_EXCEEDED.to_string()),
                chunks,
                total_size: Some(total_size),
                ..Default::default()
            },
            response: CHUNKED_SENTINEL.to_string(),
        }
    }

    /// Builder: set the responder id.
    pub fn with_server_id(mut self, server_id: impl Into<String>) -> Self {
        self.header.server_id = Some(server_id.into());
        self
    }

    /// Builder: set the path metadata.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.header.path = Some(path.into());
        self
    }

    /// Builder: set the timestamp metadata.
    pub fn with_timestamp(mut self, millis: i64) -> Self {
        self.header.timestamp = Some(millis);
        self
    }

    /// Builder: set the document metadata.
    pub fn with_doc(mut self, doc: impl Into<String>, version: impl Into<String>) -> Self {
        self.header.doc = Some(doc.into());
        self.header.doc_version = Some(version.into());
        self
    }

    /// Builder: mark the document as created.
    pub fn created(mut self) -> Self {
        self.header.created = true;
        self
    }

    /// Returns the status.
    pub fn status(&self) -> u16 {
        self.header.status
    }

    /// Returns true for `status == 200`.
    pub fn is_success(&self) -> bool {
        self.header.status == status::OK
    }

    /// Returns true for the oversized-response signal.
    pub fn is_chunked(&self) -> bool {
        self.header.status == status::PAYLOAD_TOO_LARGE && self.header.chunks > 0
    }

    /// Returns the diagnostic of a non-200 response.
    pub fn error_message(&self) -> Option<&str> {
        if self.is_success() {
            None
        } else {
            Some(self.header.error_str.as_deref().unwrap_or("unknown error"))
        }
    }

    /// Parses the response string as JSON.
    pub fn response_json<T: DeserializeOwned>(&self) -> ProtocolResult<T> {
        serde_json::from_str(&self.response).map_err(ProtocolError::InvalidBody)
    }
}
