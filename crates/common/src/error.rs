//! Errors raised by calls to the upstream communications platform.

use thiserror::Error;

/// Failure of a single upstream HTTP call.
///
/// `status` is present when the platform answered with a non-2xx code and
/// absent for transport failures and unparsable bodies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// Request never produced a response (connect error, timeout, ...).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Platform returned a non-success status.
    #[error("Upstream returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the error body, or the canonical reason.
        message: String,
    },

    /// Body was not the JSON we expected.
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl UpstreamError {
    /// HTTP status of the failed call, if the platform answered at all.
    #[must_use]
    pub fn http_status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            UpstreamError::Transport(_) | UpstreamError::Malformed(_) => None,
        }
    }

    /// Human-readable message without the variant prefix.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            UpstreamError::Transport(msg) | UpstreamError::Malformed(msg) => msg.clone(),
            UpstreamError::Status { message, .. } => message.clone(),
        }
    }
}

/// Result type alias using `UpstreamError`
pub type Result<T> = std::result::Result<T, UpstreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_only_for_status_variant() {
        let err = UpstreamError::Status {
            status: 404,
            message: "User does not exist".to_string(),
        };
        assert_eq!(err.http_status(), Some(404));
        assert_eq!(UpstreamError::Transport("reset".into()).http_status(), None);
        assert_eq!(UpstreamError::Malformed("eof".into()).http_status(), None);
    }

    #[test]
    fn test_display_and_message() {
        let err = UpstreamError::Status {
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Upstream returned 500: boom");
        assert_eq!(err.message(), "boom");
    }
}
