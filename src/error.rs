//! Error types for the bluesky-connector service.
//!
//! Every failure surfaced to a caller is a [`ConnectorError`]. Publish failures are
//! wrapped in [`ConnectorError::Step`] so the message names which post of the thread
//! (or which upload) failed.

use thiserror::Error;

use crate::atproto::models::RemoteError;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, ConnectorError>;

#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Missing or malformed input, rejected before any network call.
    #[error("validation error: {0}")]
    Validation(String),

    /// An authenticated call was attempted before any login.
    #[error("not authenticated")]
    NotAuthenticated,

    /// A refresh was requested but no login ever stored a refresh token.
    #[error("no refresh token available")]
    NoRefreshToken,

    /// Login or refresh against the session endpoints failed.
    #[error("authentication failed during {operation}: {source}")]
    Auth {
        operation: &'static str,
        #[source]
        source: Box<ConnectorError>,
    },

    /// The remote service answered with a protocol error body.
    #[error("AT Protocol error during {operation} (HTTP {status}): {code}: {message}")]
    Remote {
        operation: String,
        status: u16,
        code: String,
        message: String,
    },

    /// The remote service answered with a non-success status and no usable error body.
    #[error("HTTP error during {operation}: {status}, body: {body}")]
    HttpStatus {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("transport error during {operation}: {source}")]
    Transport {
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to decode response for {operation}: {source}")]
    Decode {
        operation: String,
        #[source]
        source: serde_json::Error,
    },

    /// The token expired and the single refresh attempt failed as well.
    #[error("{original} (failed to refresh: {refresh})")]
    RefreshFailed {
        original: Box<ConnectorError>,
        refresh: Box<ConnectorError>,
    },

    /// Link preview enrichment failed. Never leaves the enrichment code path.
    #[error("link preview enrichment failed: {0}")]
    Enrichment(String),

    /// A publish step failed; earlier posts of the thread stay published.
    #[error("failed at {step}: {source}")]
    Step {
        step: String,
        #[source]
        source: Box<ConnectorError>,
    },
}

impl ConnectorError {
    pub(crate) fn remote(operation: &str, status: u16, err: RemoteError) -> Self {
        ConnectorError::Remote {
            operation: operation.to_string(),
            status,
            code: err.error,
            message: err.message,
        }
    }

    pub(crate) fn transport(operation: &str, source: reqwest::Error) -> Self {
        ConnectorError::Transport {
            operation: operation.to_string(),
            source,
        }
    }

    pub(crate) fn decode(operation: &str, source: serde_json::Error) -> Self {
        ConnectorError::Decode {
            operation: operation.to_string(),
            source,
        }
    }

    pub(crate) fn in_step(self, step: impl Into<String>) -> Self {
        ConnectorError::Step {
            step: step.into(),
            source: Box::new(self),
        }
    }

    /// Returns the remote error code, looking through step and auth wrappers.
    pub fn remote_code(&self) -> Option<&str> {
        match self {
            ConnectorError::Remote { code, .. } => Some(code),
            ConnectorError::Step { source, .. } | ConnectorError::Auth { source, .. } => {
                source.remote_code()
            }
            ConnectorError::RefreshFailed { original, .. } => original.remote_code(),
            _ => None,
        }
    }

    /// True for errors caused by the request itself rather than the remote service.
    pub fn is_validation(&self) -> bool {
        match self {
            ConnectorError::Validation(_) => true,
            ConnectorError::Step { source, .. } => source.is_validation(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_error_keeps_context() {
        let err = ConnectorError::remote(
            "create_post",
            400,
            RemoteError {
                error: "InvalidRequest".to_string(),
                message: "Record too long".to_string(),
            },
        )
        .in_step("post 2/3");

        let text = err.to_string();
        assert!(text.contains("post 2/3"));
        assert!(text.contains("InvalidRequest: Record too long"));
        assert_eq!(err.remote_code(), Some("InvalidRequest"));
        assert!(!err.is_validation());
    }

    #[test]
    fn test_refresh_failed_mentions_both_failures() {
        let original = ConnectorError::remote(
            "create_post",
            400,
            RemoteError {
                error: "ExpiredToken".to_string(),
                message: "Token has expired".to_string(),
            },
        );
        let refresh = ConnectorError::Auth {
            operation: "refresh_session",
            source: Box::new(ConnectorError::remote(
                "refresh_session",
                400,
                RemoteError {
                    error: "ExpiredToken".to_string(),
                    message: "Refresh token has expired".to_string(),
                },
            )),
        };
        let err = ConnectorError::RefreshFailed {
            original: Box::new(original),
            refresh: Box::new(refresh),
        };

        let text = err.to_string();
        assert!(text.contains("Token has expired"));
        assert!(text.contains("failed to refresh"));
        assert!(text.contains("Refresh token has expired"));
    }
}
