//! Update notifications.
//!
//! Services announce changes to entities and documents with these messages.
//! They travel through the same codec as request and response envelopes.

use serde::{Deserialize, Serialize};

use crate::codec::WireEnvelope;
use crate::error::{ProtocolError, ProtocolResult};
use crate::wire;

/// Header of an entity update.
#[derive(Debug, Clone, Default, Eq, Serialize, Deserialize)]
pub struct EntityUpdateHeader {
    /// Kind of update, e.g. `"PUT"`.
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub mode: String,
    /// Entity name.
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub entity: String,
    /// Entity path.
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub entity_path: String,
    /// Id of the service that emitted the update.
    #[serde(
        rename = "serverID",
        default,
        deserialize_with = "wire::empty_as_none",
        skip_serializing_if = "wire::is_blank"
    )]
    pub server_id: Option<String>,
}

impl PartialEq for EntityUpdateHeader {
    fn eq(&self, other: &Self) -> bool {
        self.mode == other.mode
            && self.entity == other.entity
            && self.entity_path == other.entity_path
            && wire::same_text(&self.server_id, &other.server_id)
    }
}

/// Entity update: header plus raw payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityUpdate {
    /// Update metadata.
    pub header: EntityUpdateHeader,
    /// Payload bytes.
    #[serde(default, with = "wire::bytes")]
    pub buffer: Vec<u8>,
}

impl EntityUpdate {
    /// Creates an update for `entity`.
    pub fn new(mode: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            header: EntityUpdateHeader {
                mode: mode.into(),
                entity: entity.into(),
                ..Default::default()
            },
            buffer: Vec::new(),
        }
    }

    /// Builder: set the entity path.
    pub fn with_entity_path(mut self, path: impl Into<String>) -> Self {
        self.header.entity_path = path.into();
        self
    }

    /// Builder: set the payload.
    pub fn with_buffer(mut self, buffer: impl Into<Vec<u8>>) -> Self {
        self.buffer = buffer.into();
        self
    }
}

impl WireEnvelope for EntityUpdate {
    fn validate(&self) -> ProtocolResult<()> {
        if self.header.mode.is_empty() {
            return Err(ProtocolError::MissingField("mode"));
        }
        if self.header.entity.is_empty() {
            return Err(ProtocolError::MissingField("entity"));
        }
        Ok(())
    }
}

/// Header of a document update.
#[derive(Debug, Clone, Default, Eq, Serialize, Deserialize)]
pub struct DataUpdateHeader {
    /// Whether the document was created by this update.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub created: bool,
    /// Epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Resource path.
    #[serde(
        default,
        deserialize_with = "wire::empty_as_none",
        skip_serializing_if = "wire::is_blank"
    )]
    pub path: Option<String>,
    /// Document id.
    #[serde(
        rename = "docId",
        default,
        deserialize_with = "wire::empty_as_none",
        skip_serializing_if = "wire::is_blank"
    )]
    pub doc: Option<String>,
    /// Document version.
    #[serde(
        rename = "docVersion",
        default,
        deserialize_with = "wire::empty_as_none",
        skip_serializing_if = "wire::is_blank"
    )]
    pub doc_version: Option<String>,
    /// Expiry in epoch milliseconds, 0 for none.
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub expiry: i64,
    /// Id of the service that emitted the update.
    #[serde(
        rename = "serverID",
        default,
        deserialize_with = "wire::empty_as_none",
        skip_serializing_if = "wire::is_blank"
    )]
    pub server_id: Option<String>,
    /// Entity name.
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub entity: String,
    /// Entity path.
    #[serde(
        rename = "entityPath",
        default,
        deserialize_with = "wire::empty_as_none",
        skip_serializing_if = "wire::is_blank"
    )]
    pub entity_path: Option<String>,
    /// Document path.
    #[serde(
        rename = "docPath",
        default,
        deserialize_with = "wire::empty_as_none",
        skip_serializing_if = "wire::is_blank"
    )]
    pub doc_path: Option<String>,
    /// Tags.
    #[serde(
        default,
        deserialize_with = "wire::null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tarray: Vec<String>,
    /// Access level, e.g. `"public"`.
    #[serde(
        rename = "entityAccess",
        default,
        deserialize_with = "wire::null_as_default"
    )]
    pub entity_access: String,
    /// Relation id the update belongs to.
    #[serde(
        default,
        deserialize_with = "wire::empty_as_none",
        skip_serializing_if = "wire::is_blank"
    )]
    pub rdid: Option<String>,
}

impl PartialEq for DataUpdateHeader {
    fn eq(&self, other: &Self) -> bool {
        self.created == other.created
            && self.timestamp == other.timestamp
            && wire::same_text(&self.path, &other.path)
            && wire::same_text(&self.doc, &other.doc)
            && wire::same_text(&self.doc_version, &other.doc_version)
            && self.expiry == other.expiry
            && wire::same_text(&self.server_id, &other.server_id)
            && self.entity == other.entity
            && wire::same_text(&self.entity_path, &other.entity_path)
            && wire::same_text(&self.doc_path, &other.doc_path)
            && self.tarray == other.tarray
            && self.entity_access == other.entity_access
            && wire::same_text(&self.rdid, &other.rdid)
    }
}

/// Document update: header plus raw payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataUpdate {
    /// Update metadata.
    pub header: DataUpdateHeader,
    /// Payload bytes.
    #[serde(default, with = "wire::bytes")]
    pub buffer: Vec<u8>,
}

impl DataUpdate {
    /// Creates an update of a document belonging to `entity`.
    pub fn new(entity: impl Into<String>, entity_access: impl Into<String>) -> Self {
        Self {
            header: DataUpdateHeader {
                entity: entity.into(),
                entity_access: entity_access.into(),
                ..Default::default()
            },
            buffer: Vec::new(),
        }
    }

    /// Builder: set the document id and version.
    pub fn with_doc(mut self, doc: impl Into<String>, version: impl Into<String>) -> Self {
        self.header.doc = Some(doc.into());
        self.header.doc_version = Some(version.into());
        self
    }

    /// Builder: set the relation id.
    pub fn with_rdid(mut self, rdid: impl Into<String>) -> Self {
        self.header.rdid = Some(rdid.into());
        self
    }

    /// Builder: set the payload.
    pub fn with_buffer(mut self, buffer: impl Into<Vec<u8>>) -> Self {
        self.buffer = buffer.into();
        self
    }
}

impl WireEnvelope for DataUpdate {
    fn validate(&self) -> ProtocolResult<()> {
        if self.header.entity.is_empty() {
            return Err(ProtocolError::MissingField("entity"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};

    #[test]
    fn entity_update_wire_shape() {
        let update = EntityUpdate::new("PUT", "clients")
            .with_entity_path("/tester18/clients")
            .with_buffer(b"hi".to_vec());
        let json = String::from_utf8(encode(&update).unwrap()).unwrap();
        insta::assert_snapshot!(json, @r#"{"header":{"mode":"PUT","entity":"clients","entity_path":"/tester18/clients"},"buffer":"aGk="}"#);
    }

    #[test]
    fn data_update_wire_shape() {
        let mut update = DataUpdate::new("clients", "public")
            .with_doc("doc-1", "2")
            .with_rdid("rdid-7");
        update.header.tarray = vec!["a".into()];
        update.header.entity_path = Some("/tester18/clients".into());

        let json = String::from_utf8(encode(&update).unwrap()).unwrap();
        insta::assert_snapshot!(json, @r#"{"header":{"docId":"doc-1","docVersion":"2","expiry":0,"entity":"clients","entityPath":"/tester18/clients","tarray":["a"],"entityAccess":"public","rdid":"rdid-7"},"buffer":""}"#);
    }

    #[test]
    fn data_update_tolerates_peer_defaults() {
        let data = br#"{"header":{"entity":"clients","entityAccess":"rw","expiry":0,
            "docId":"","serverID":"","tarray":null,"rdid":""},"buffer":null}"#;
        let update: DataUpdate = decode(data).unwrap();
        assert_eq!(update.header.doc, None);
        assert_eq!(update.header.server_id, None);
        assert!(update.header.tarray.is_empty());
        assert!(update.buffer.is_empty());
    }

    #[test]
    fn updates_require_an_entity() {
        let result: ProtocolResult<DataUpdate> = decode(br#"{"header":{"expiry":1}}"#);
        assert!(matches!(result, Err(ProtocolError::MissingField("entity"))));

        let result: ProtocolResult<EntityUpdate> =
            decode(br#"{"header":{"entity":"clients"},"buffer":""}"#);
        assert!(matches!(result, Err(ProtocolError::MissingField("mode"))));
    }
}
