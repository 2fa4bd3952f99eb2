//! Backend API error types

use requestkit::TrackError;
use thiserror::Error;

/// Errors from the backend's HTTP surface
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Outcome relayed from a coalesced in-flight request
    #[error("{0}")]
    Shared(String),
}

impl ApiError {
    /// Whether a retry could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Http { status, .. } => matches!(status, 408 | 429 | 500 | 502 | 503 | 504 | 529),
            ApiError::Network(_) => true,
            ApiError::Json(_) => false,
            ApiError::InvalidResponse(_) => false,
            ApiError::Shared(_) => false,
        }
    }
}

impl From<TrackError> for ApiError {
    fn from(err: TrackError) -> Self {
        match err {
            TrackError::Upstream(message) => ApiError::Shared(message),
            TrackError::Codec(e) => ApiError::Json(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        for status in [408, 429, 500, 502, 503, 504, 529] {
            let err = ApiError::Http {
                status,
                message: String::new(),
            };
            assert!(err.is_retryable(), "status {} should be retryable", status);
        }
    }

    #[test]
    fn test_client_errors_not_retryable() {
        for status in [400, 401, 403, 404, 409, 422] {
            let err = ApiError::Http {
                status,
                message: String::new(),
            };
            assert!(!err.is_retryable(), "status {} should not be retryable", status);
        }
    }

    #[test]
    fn test_shared_outcome_not_retryable() {
        // A coalesced caller did not own the request; retrying here would
        // multiply the very calls deduplication removed
        assert!(!ApiError::Shared("backend unavailable".to_string()).is_retryable());
    }
}
