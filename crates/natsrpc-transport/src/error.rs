//! Transport error types.

use std::time::Duration;

use thiserror::Error;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Connection-level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No reply arrived before the deadline.
    #[error("request on `{subject}` timed out after {timeout:?}")]
    Timeout { subject: String, timeout: Duration },

    /// Payload larger than the transport accepts.
    #[error("payload of {size} bytes exceeds maximum payload of {max} bytes")]
    MaxPayloadExceeded { size: usize, max: usize },

    /// The connection was closed.
    #[error("connection closed")]
    Closed,

    /// `respond` on a message that was published without a reply subject.
    #[error("message on `{subject}` has no reply subject")]
    NoReplySubject { subject: String },

    /// Empty subject or subject containing whitespace.
    #[error("invalid subject: {0:?}")]
    InvalidSubject(String),
}

impl TransportError {
    /// Creates a timeout error.
    pub fn timeout(subject: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            subject: subject.into(),
            timeout,
        }
    }

    /// Returns true for [`TransportError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Validates a subject or queue group name.
pub(crate) fn check_subject(subject: &str) -> TransportResult<()> {
    if subject.is_empty() || subject.chars().any(char::is_whitespace) {
        return Err(TransportError::InvalidSubject(subject.to_string()));
    }
    Ok(())
}
