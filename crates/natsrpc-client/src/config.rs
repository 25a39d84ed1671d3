//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/natsrpc/config.toml` by default.
//!
//! `requestor` and `passcode` support secret references:
//! - `pass::path/in/store`: resolved via `pass show`
//! - `env::VAR_NAME`: resolved from the environment
//! - plain text: used as-is

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use natsrpc_server::ServerConfig;
use natsrpc_transport::{BusConfig, DEFAULT_MAX_PAYLOAD};

use crate::auth::Credentials;
use crate::error::{ClientError, ClientResult};
use crate::secret;

/// Configuration for the natsrpc client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Request settings.
    pub client: ClientSettings,

    /// Login and registration settings.
    pub auth: AuthSettings,

    /// Settings of the local responders started by `demo`.
    pub server: ServerSettings,

    /// Transport settings.
    pub transport: TransportSettings,
}

/// Request settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Subject requests are published on.
    pub subject: String,

    /// Per-request deadline in seconds.
    pub timeout: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            subject: natsrpc_server::DEFAULT_SUBJECT.to_string(),
            timeout: 2,
        }
    }
}

/// Login and registration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Requestor id (supports `pass::` and `env::` prefixes).
    pub requestor: Option<String>,

    /// Requestor passcode (supports `pass::` and `env::` prefixes).
    pub passcode: Option<String>,

    /// Identity registered after login.
    pub identity: Option<String>,

    /// Fixed token expiry in epoch milliseconds.
    pub expires: Option<i64>,

    /// Token lifetime in seconds when `expires` is unset.
    pub token_ttl: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            requestor: None,
            passcode: None,
            identity: None,
            expires: None,
            token_ttl: 24 * 60 * 60,
        }
    }
}

/// Settings of local responders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Queue group of the responders.
    pub queue_group: String,

    /// Number of workers.
    pub workers: usize,

    /// Receive wait per iteration in seconds.
    pub max_wait: u64,

    /// Display name.
    pub name: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            queue_group: natsrpc_server::DEFAULT_QUEUE_GROUP.to_string(),
            workers: 2,
            max_wait: natsrpc_server::DEFAULT_MAX_WAIT.as_secs(),
            name: "D_ISP Responder".to_string(),
        }
    }
}

/// Transport settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Connection name.
    pub name: String,

    /// Maximum payload in bytes.
    pub max_payload: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            name: "DISP-NATS Microservice-runner".to_string(),
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from the default path.
    ///
    /// A missing file yields the defaults.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            ClientError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("natsrpc")
    }

    /// Per-request deadline.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.client.timeout)
    }

    /// Token lifetime used when no expiry is configured.
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.auth.token_ttl)
    }

    /// Resolves the configured credentials, if both parts are set.
    pub fn credentials(&self) -> ClientResult<Option<Credentials>> {
        match (&self.auth.requestor, &self.auth.passcode) {
            (Some(requestor), Some(passcode)) => Ok(Some(Credentials::new(
                secret::resolve(requestor)?,
                secret::resolve(passcode)?,
            ))),
            (None, None) => Ok(None),
            _ => Err(ClientError::Config(
                "auth.requestor and auth.passcode must be set together".to_string(),
            )),
        }
    }

    /// Responder configuration for local workers.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::new(self.client.subject.clone())
            .with_queue_group(self.server.queue_group.clone())
            .with_workers(self.server.workers)
            .with_max_wait(Duration::from_secs(self.server.max_wait))
            .with_name(self.server.name.clone())
    }

    /// In-memory bus configuration.
    pub fn bus_config(&self) -> BusConfig {
        BusConfig::default()
            .with_name(self.transport.name.clone())
            .with_max_payload(self.transport.max_payload)
    }

    /// Checks values that would only fail later at runtime.
    pub fn validate(&self) -> ClientResult<()> {
        if self.client.subject.trim().is_empty() {
            return Err(ClientError::Config("client.subject must not be empty".into()));
        }
        if self.client.timeout == 0 {
            return Err(ClientError::Config("client.timeout must be positive".into()));
        }
        if self.transport.max_payload <= natsrpc_protocol::chunk::ENVELOPE_HEADROOM {
            return Err(ClientError::Config(format!(
                "transport.max_payload must exceed {} bytes",
                natsrpc_protocol::chunk::ENVELOPE_HEADROOM
            )));
        }
        self.server_config().validate()?;
        Ok(())
    }
}
