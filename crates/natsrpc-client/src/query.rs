//! Resource reads addressed by relation id.

use serde_json::{Map, Value};

use natsrpc_protocol::{Flags, RequestEnvelope};

use crate::session::Session;

/// Builder for `/{domain}/{entity}/{rdid}/{aspect}` requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceQuery {
    domain: String,
    entity: String,
    rdid: String,
    aspect: String,
    entity_access: Option<String>,
    with_header: bool,
    key: Option<String>,
    value: Option<String>,
    timestamp: Option<String>,
}

impl ResourceQuery {
    /// Query of `aspect` for the relation `rdid`.
    pub fn new(
        domain: impl Into<String>,
        entity: impl Into<String>,
        rdid: impl Into<String>,
        aspect: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            entity: entity.into(),
            rdid: rdid.into(),
            aspect: aspect.into(),
            entity_access: None,
            with_header: false,
            key: None,
            value: None,
            timestamp: None,
        }
    }

    /// Query of the `claims` aspect.
    pub fn claims(
        domain: impl Into<String>,
        entity: impl Into<String>,
        rdid: impl Into<String>,
    ) -> Self {
        Self::new(domain, entity, rdid, "claims")
    }

    /// Builder: set the access level.
    pub fn with_entity_access(mut self, access: impl Into<String>) -> Self {
        self.entity_access = Some(access.into());
        self
    }

    /// Builder: ask for document headers in the result.
    pub fn with_header(mut self, with_header: bool) -> Self {
        self.with_header = with_header;
        self
    }

    /// Builder: select a key inside the aspect.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Builder: select a value of the key.
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Builder: select a version, e.g. `"latest"`.
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Request path.
    pub fn path(&self) -> String {
        format!(
            "/{}/{}/{}/{}",
            self.domain, self.entity, self.rdid, self.aspect
        )
    }

    /// Request flags.
    pub fn flags(&self) -> Flags {
        let mut map = Map::new();
        map.insert("domain".into(), Value::from(self.domain.as_str()));
        map.insert("entity".into(), Value::from(self.entity.as_str()));
        map.insert("token".into(), Value::from(self.rdid.as_str()));
        map.insert("aspect".into(), Value::from(self.aspect.as_str()));
        if let Some(access) = &self.entity_access {
            map.insert("entityAccess".into(), Value::from(access.as_str()));
        }
        if self.with_header {
            map.insert("withHeader".into(), Value::Bool(true));
        }
        if let Some(key) = &self.key {
            map.insert("k".into(), Value::from(key.as_str()));
        }
        if let Some(value) = &self.value {
            map.insert("v".into(), Value::from(value.as_str()));
        }
        if let Some(timestamp) = &self.timestamp {
            map.insert("timestamp".into(), Value::from(timestamp.as_str()));
        }
        Flags::from_map(map)
    }

    /// Builds the request with the session token attached.
    pub fn request(&self, mode: &str, session: &Session, body: Vec<u8>) -> RequestEnvelope {
        session.authorize(
            RequestEnvelope::new(mode, self.path())
                .with_flags(self.flags())
                .with_body(body),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Token;

    #[test]
    fn claims_path_and_token() {
        let mut session = Session::new();
        session.set_token(Token::new("abc123", 999_999_999_999));

        let request = ResourceQuery::claims("domain", "entity", "abc123").request(
            "GET",
            &session,
            Vec::new(),
        );
        assert_eq!(request.header.path, "/domain/entity/abc123/claims");
        assert_eq!(request.header.authorization, "abc123");
        assert_eq!(request.header.flags.get("aspect"), Some(Value::from("claims")));
    }

    #[test]
    fn optional_flags_are_only_set_when_given() {
        let flags = ResourceQuery::claims("tester18", "clients", "rd-1").flags();
        assert_eq!(flags.get("withHeader"), None);
        assert_eq!(flags.get("k"), None);

        let flags = ResourceQuery::claims("tester18", "clients", "rd-1")
            .with_entity_access("public")
            .with_header(true)
            .with_key("annotations")
            .with_timestamp("latest")
            .flags();
        assert_eq!(flags.get("entityAccess"), Some(Value::from("public")));
        assert_eq!(flags.get("withHeader"), Some(Value::Bool(true)));
        assert_eq!(flags.get("k"), Some(Value::from("annotations")));
        assert_eq!(flags.get("token"), Some(Value::from("rd-1")));
        assert_eq!(flags.get("timestamp"), Some(Value::from("latest")));
    }
}
