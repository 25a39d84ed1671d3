//! Per-caller authentication state.

use chrono::{DateTime, Utc};

use natsrpc_protocol::RequestEnvelope;

/// Bearer token returned by a login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    value: String,
    expires: i64,
}

impl Token {
    /// Creates a token that expires at `expires` (epoch milliseconds).
    pub fn new(value: impl Into<String>, expires: i64) -> Self {
        Self {
            value: value.into(),
            expires,
        }
    }

    /// The bearer string.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Expiry requested at login, in epoch milliseconds.
    pub fn expires(&self) -> i64 {
        self.expires
    }

    /// Expiry as a timestamp.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        natsrpc_core::from_epoch_millis(self.expires)
    }
}

/// Token and relation id of one caller.
///
/// Every authenticated call reads the token from the session it is given;
/// independent sessions never see each other's credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    token: Option<Token>,
    rdid: Option<String>,
}

impl Session {
    /// Creates an unauthenticated session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current token.
    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    /// Relation id from the last successful registration.
    pub fn rdid(&self) -> Option<&str> {
        self.rdid.as_deref()
    }

    /// Returns true once a login succeeded.
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Value for the `authorization` header; empty before login.
    pub fn authorization(&self) -> &str {
        self.token.as_ref().map(Token::value).unwrap_or_default()
    }

    /// Replaces the token.
    pub fn set_token(&mut self, token: Token) {
        self.token = Some(token);
    }

    /// Drops the token.
    pub fn clear_token(&mut self) {
        self.token = None;
    }

    /// Stores the relation id.
    pub fn set_rdid(&mut self, rdid: impl Into<String>) {
        self.rdid = Some(rdid.into());
    }

    /// Drops the relation id.
    pub fn clear_rdid(&mut self) {
        self.rdid = None;
    }

    /// Attaches the session token to `request`.
    pub fn authorize(&self, request: RequestEnvelope) -> RequestEnvelope {
        request.with_authorization(self.authorization())
    }
}
