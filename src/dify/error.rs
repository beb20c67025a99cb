//! Dify transport error types.
//!
//! A workflow call either succeeds or fails once; the caller records the
//! failure against the record being processed and moves on. There is no
//! automatic retry at this layer.

use std::time::Duration;
use thiserror::Error;

/// Error from a single Dify workflow invocation.
#[derive(Debug, Error)]
pub enum DifyError {
    /// The call exceeded the configured timeout. Generation workflows run
    /// for minutes, so the bound is generous, but it is a hard bound.
    #[error("workflow call timed out after {0:?}")]
    Timeout(Duration),

    /// Connection-level failure (DNS, refused, reset).
    #[error("network error: {0}")]
    Network(String),

    /// The API answered with a non-success status.
    #[error("workflow API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The API answered 200 but the body was not a workflow result.
    #[error("malformed workflow response: {0}")]
    Malformed(String),
}

impl DifyError {
    /// Build a status error, keeping only the leading part of a long body.
    pub fn from_status(status: u16, body: &str) -> Self {
        let body = body.chars().take(500).collect();
        DifyError::Status { status, body }
    }

    /// Whether the failure was caused by the caller (bad key, bad inputs)
    /// rather than the service. Used only for log levels.
    pub fn is_client_error(&self) -> bool {
        matches!(self, DifyError::Status { status, .. } if (400..500).contains(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_body_truncated() {
        let long = "x".repeat(2000);
        match DifyError::from_status(500, &long) {
            DifyError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body.len(), 500);
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_client_error_classification() {
        assert!(DifyError::from_status(401, "unauthorized").is_client_error());
        assert!(!DifyError::from_status(503, "busy").is_client_error());
        assert!(!DifyError::Network("reset".to_string()).is_client_error());
    }

    #[test]
    fn test_display_includes_status() {
        let err = DifyError::from_status(429, "too many requests");
        let text = format!("{}", err);
        assert!(text.contains("429"));
        assert!(text.contains("too many requests"));
    }
}
