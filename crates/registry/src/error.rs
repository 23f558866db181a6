//! Error types for registry requests.
//!
//! HTTP failures are classified with [`ErrorCategory`] and converted into
//! [`RemoteError`] at the [`Remote`](ontology::Remote) boundary.

use ontology::{ErrorCategory, RemoteError, VersionedUrl};

/// Result type alias for registry requests.
pub type Result<T> = std::result::Result<T, Error>;

/// Longest response body kept in an error message.
const MAX_MESSAGE_LEN: usize = 512;

/// Errors that can occur while talking to the registry.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The registry answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        message: String,
    },

    /// The request never got a response.
    #[error("HTTP request failed: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("invalid registry response: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Create a status error, trimming long bodies.
    pub fn status(status: u16, body: &str) -> Self {
        let body = body.trim();
        let message = if body.is_empty() {
            "no response body".to_string()
        } else if body.len() > MAX_MESSAGE_LEN {
            let cut = (0..=MAX_MESSAGE_LEN)
                .rev()
                .find(|&i| body.is_char_boundary(i))
                .unwrap_or(0);
            format!("{}...", &body[..cut])
        } else {
            body.to_string()
        };
        Self::Status { status, message }
    }

    /// Get the error category for retry logic.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Status { status: 409, .. } => ErrorCategory::AlreadyExists,
            Self::Status { status: 404, .. } => ErrorCategory::NotFound,
            // Request timeout and rate limiting are worth another attempt
            Self::Status {
                status: 408 | 429, ..
            } => ErrorCategory::Network,
            Self::Status {
                status: 400..=499, ..
            } => ErrorCategory::Rejected,
            Self::Status { .. } | Self::Transport(_) => ErrorCategory::Network,
            Self::InvalidResponse(_) => ErrorCategory::Format,
        }
    }

    /// Convert into a [`RemoteError`] about a specific type version.
    pub fn for_target(self, target: &VersionedUrl) -> RemoteError {
        match self.category() {
            ErrorCategory::AlreadyExists => RemoteError::AlreadyExists {
                target: target.clone(),
            },
            ErrorCategory::NotFound => RemoteError::NotFound {
                target: target.to_string(),
            },
            ErrorCategory::Rejected => {
                let message = match self {
                    Self::Status { message, .. } => message,
                    other => other.to_string(),
                };
                RemoteError::rejected(target, message)
            }
            _ => self.into(),
        }
    }
}

impl From<Error> for RemoteError {
    fn from(err: Error) -> Self {
        let category = err.category();
        match err {
            Error::Status { status, .. } if category.is_retryable() => {
                RemoteError::network(err.to_string(), Some(status))
            }
            Error::Status { .. } => RemoteError::Other(err.to_string()),
            Error::Transport(message) => RemoteError::network(message, None),
            Error::InvalidResponse(message) => RemoteError::InvalidResponse(message),
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::status(code, ""),
            ureq::Error::Json(e) => Self::InvalidResponse(e.to_string()),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ontology::BaseUrl;

    fn target() -> VersionedUrl {
        BaseUrl::new("https://example.com/@acme/types/property-type/name/")
            .unwrap()
            .at(2)
    }

    #[test]
    fn test_status_categories() {
        assert_eq!(Error::status(409, "").category(), ErrorCategory::AlreadyExists);
        assert_eq!(Error::status(404, "").category(), ErrorCategory::NotFound);
        assert_eq!(Error::status(400, "").category(), ErrorCategory::Rejected);
        assert_eq!(Error::status(422, "").category(), ErrorCategory::Rejected);
        assert_eq!(Error::status(429, "").category(), ErrorCategory::Network);
        assert_eq!(Error::status(503, "").category(), ErrorCategory::Network);
        assert_eq!(
            Error::Transport("connection refused".into()).category(),
            ErrorCategory::Network
        );
        assert_eq!(
            Error::InvalidResponse("eof".into()).category(),
            ErrorCategory::Format
        );
    }

    #[test]
    fn test_for_target_conflict_is_already_exists() {
        let err = Error::status(409, "version exists").for_target(&target());
        assert_eq!(err, RemoteError::AlreadyExists { target: target() });
        assert!(err.is_ignorable());
    }

    #[test]
    fn test_for_target_rejection_keeps_body() {
        let err = Error::status(400, "  missing title \n").for_target(&target());
        match err {
            RemoteError::Rejected { target: t, message } => {
                assert_eq!(t, target().to_string());
                assert_eq!(message, "missing title");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_server_errors_are_retryable() {
        let err = Error::status(502, "bad gateway").for_target(&target());
        assert!(err.is_retryable());
        assert!(matches!(err, RemoteError::Network { status: Some(502), .. }));

        let err: RemoteError = Error::Transport("timed out".into()).into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "x".repeat(MAX_MESSAGE_LEN * 2);
        let Error::Status { message, .. } = Error::status(500, &body) else {
            panic!("expected status error");
        };
        assert_eq!(message.len(), MAX_MESSAGE_LEN + 3);
        assert!(message.ends_with("..."));
    }

    #[test]
    fn test_empty_body_message() {
        assert_eq!(Error::status(500, "").to_string(), "HTTP 500: no response body");
    }
}
