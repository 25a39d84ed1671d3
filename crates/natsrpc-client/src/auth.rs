//! Login and relation registration.
//!
//! Both steps are independent round trips. A failed login leaves the
//! session without a token; a failed registration leaves it without an RDID
//! but keeps the token.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use natsrpc_protocol::{Flags, LOGIN_PATH, ProtocolError, RELATION_REGISTER_PATH, RequestEnvelope};

use crate::error::{ClientError, ClientResult};
use crate::rpc::RpcClient;
use crate::session::{Session, Token};

/// Default lifetime requested for a token when the caller gives no expiry.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Requestor credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Requestor id.
    pub username: String,
    /// Requestor passcode.
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Body of a login request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    /// Requested token expiry, epoch milliseconds.
    pub expires: i64,
}

/// Body of a successful login response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

/// Obtains tokens and relation ids for a [`Session`].
#[derive(Debug, Clone)]
pub struct AuthBroker {
    rpc: RpcClient,
    token_ttl: Duration,
}

impl AuthBroker {
    /// Creates a broker sending through `rpc`.
    pub fn new(rpc: RpcClient) -> Self {
        Self {
            rpc,
            token_ttl: DEFAULT_TOKEN_TTL,
        }
    }

    /// Builder: set the lifetime requested when no expiry is given.
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Logs in and stores the token in `session`.
    ///
    /// `expires` is the requested expiry in epoch milliseconds; `None`
    /// requests now plus the token TTL.
    pub async fn login(
        &self,
        session: &mut Session,
        credentials: &Credentials,
        expires: Option<i64>,
    ) -> ClientResult<Token> {
        session.clear_token();
        let expires = expires.unwrap_or_else(|| natsrpc_core::millis_from_now(self.token_ttl));
        let body = LoginRequest {
            username: credentials.username.clone(),
            password: credentials.password.clone(),
            expires,
        };
        let request = RequestEnvelope::post(LOGIN_PATH).with_json_body(&body)?;

        let response = self.rpc.send(&request).await?;
        if !response.is_success() {
            let err = ClientError::application(&response);
            warn!(username = %credentials.username, error = %err, "Login rejected");
            return Err(err);
        }

        let reply: LoginResponse = response.response_json()?;
        if reply.token.is_empty() {
            return Err(ProtocolError::MissingField("token").into());
        }

        let token = Token::new(reply.token, expires);
        session.set_token(token.clone());
        info!(username = %credentials.username, expires, "Logged in");
        Ok(token)
    }

    /// Registers a relation for `identity` and stores the RDID in `session`.
    pub async fn register_relation(
        &self,
        session: &mut Session,
        identity: &str,
        payload: Vec<u8>,
    ) -> ClientResult<String> {
        session.clear_rdid();
        if !session.is_authenticated() {
            return Err(ClientError::NotAuthenticated);
        }

        let request = session.authorize(
            RequestEnvelope::post(RELATION_REGISTER_PATH)
                .with_flags(Flags::relation(identity))
                .with_body(payload),
        );

        let response = self.rpc.send(&request).await?;
        if !response.is_success() {
            let err = ClientError::application(&response);
            warn!(identity, error = %err, "Relation registration rejected");
            return Err(err);
        }

        let rdid = response.response;
        debug!(identity, rdid = %rdid, "Relation registered");
        session.set_rdid(rdid.clone());
        Ok(rdid)
    }
}
