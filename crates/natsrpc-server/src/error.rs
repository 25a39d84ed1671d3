//! Server error types.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that stop a responder.
///
/// Per-request failures never surface here; they become error replies or
/// dropped messages.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Transport error (subscribe, receive).
    #[error("Transport error: {0}")]
    Transport(#[from] natsrpc_transport::TransportError),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] natsrpc_protocol::ProtocolError),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Invalid route pattern.
    #[error("Invalid route pattern `{pattern}`: {reason}")]
    Route { pattern: String, reason: String },
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a route pattern error.
    pub fn route(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Route {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if this error means the transport went away.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            Self::Transport(natsrpc_transport::TransportError::Closed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ServerError::config("workers must be at least 1");
        assert_eq!(
            err.to_string(),
            "Configuration error: workers must be at least 1"
        );
    }

    #[test]
    fn closed_transport_is_detected() {
        let err = ServerError::from(natsrpc_transport::TransportError::Closed);
        assert!(err.is_closed());
        assert!(!ServerError::config("x").is_closed());
    }
}
