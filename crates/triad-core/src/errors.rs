use std::time::Duration;

/// Typed error hierarchy for calls to a text-generation backend.
/// Classifies errors as retryable under the fixed backoff schedule or not.
#[derive(Clone, Debug, thiserror::Error)]
pub enum BackendError {
    // Retryable
    #[error("rate limited")]
    RateLimited,
    #[error("backend status {status}: {body}")]
    BackendStatus { status: u16, body: String },

    // Non-retryable: advance to the next backend immediately
    #[error("network error: {0}")]
    Network(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Only rate limits and backend status failures consume backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::BackendStatus { .. })
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::BackendStatus { .. } => "backend_status",
            Self::Network(_) => "network",
            Self::Timeout(_) => "timeout",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Other(_) => "other",
        }
    }

    /// Classify a non-success HTTP status code.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => Self::RateLimited,
            _ => Self::BackendStatus { status, body },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(BackendError::RateLimited.is_retryable());
        assert!(BackendError::BackendStatus { status: 503, body: "down".into() }.is_retryable());
    }

    #[test]
    fn non_retryable_classification() {
        assert!(!BackendError::Network("reset".into()).is_retryable());
        assert!(!BackendError::Timeout(Duration::from_secs(10)).is_retryable());
        assert!(!BackendError::MalformedResponse("no choices".into()).is_retryable());
        assert!(!BackendError::Other("boom".into()).is_retryable());
    }

    #[test]
    fn from_status_mapping() {
        assert!(matches!(
            BackendError::from_status(429, "slow down".into()),
            BackendError::RateLimited
        ));
        assert!(matches!(
            BackendError::from_status(502, "bad gateway".into()),
            BackendError::BackendStatus { status: 502, .. }
        ));
        assert!(BackendError::from_status(401, "unauthorized".into()).is_retryable());
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(BackendError::RateLimited.error_kind(), "rate_limited");
        assert_eq!(BackendError::Network("x".into()).error_kind(), "network");
        assert_eq!(
            BackendError::BackendStatus { status: 500, body: String::new() }.error_kind(),
            "backend_status"
        );
    }
}
