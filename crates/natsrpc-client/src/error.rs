//! Client error types.

use std::fmt;
use std::time::Duration;

use natsrpc_protocol::{ProtocolError, ResponseEnvelope};
use natsrpc_transport::TransportError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug)]
pub enum ClientError {
    /// Connection-level failure.
    Transport(TransportError),
    /// No reply before the deadline.
    Timeout { subject: String, timeout: Duration },
    /// Reply did not decode, or a chunked reply did not reassemble.
    Protocol(ProtocolError),
    /// The responder answered with `status != 200`.
    Application { status: u16, message: String },
    /// Operation needs a token and the session has none.
    NotAuthenticated,
    /// Local responders failed to start or stop.
    Responder(String),
    /// Configuration error.
    Config(String),
    /// IO error.
    Io(std::io::Error),
}

impl ClientError {
    /// Application error from a non-200 response.
    pub fn application(response: &ResponseEnvelope) -> Self {
        Self::Application {
            status: response.status(),
            message: response.error_message().unwrap_or_default().to_string(),
        }
    }

    /// Returns true for [`ClientError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Status of an application error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Application { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(err) => write!(f, "transport error: {}", err),
            Self::Timeout { subject, timeout } => {
                write!(f, "timeout: no reply on `{}` within {:?}", subject, timeout)
            }
            Self::Protocol(err) => write!(f, "protocol error: {}", err),
            Self::Application { status, message } => {
                write!(f, "request failed with status {}: {}", status, message)
            }
            Self::NotAuthenticated => write!(f, "not authenticated: login first"),
            Self::Responder(msg) => write!(f, "responder error: {}", msg),
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
            Self::Protocol(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout { subject, timeout } => Self::Timeout { subject, timeout },
            other => Self::Transport(other),
        }
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err)
    }
}

impl From<natsrpc_server::ServerError> for ClientError {
    fn from(err: natsrpc_server::ServerError) -> Self {
        Self::Responder(err.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use natsrpc_protocol::status;

    #[test]
    fn transport_timeout_maps_to_timeout() {
        let err = ClientError::from(TransportError::timeout("micro-master", Duration::from_secs(2)));
        assert!(err.is_timeout());
        assert_eq!(
            err.to_string(),
            "timeout: no reply on `micro-master` within 2s"
        );

        let err = ClientError::from(TransportError::Closed);
        assert!(matches!(err, ClientError::Transport(TransportError::Closed)));
    }

    #[test]
    fn application_error_from_response() {
        let response = ResponseEnvelope::unauthorized("bad passcode");
        let err = ClientError::application(&response);
        assert_eq!(err.status(), Some(status::UNAUTHORIZED));
        assert_eq!(
            err.to_string(),
            "request failed with status 401: bad passcode"
        );
    }
}
