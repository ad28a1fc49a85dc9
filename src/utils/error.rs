//! Error types for provider communication
//!
//! Transport-level failures of the Rate-Limited Client. A "not found" response
//! is not an error here: the client reports it as an empty result.

use thiserror::Error;

/// Errors that can occur while fetching from the scheduling provider
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered 429 on every attempt
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Server error with status code
    #[error("Server error: {0}")]
    ServerError(u16),

    /// Non-retryable client error (bad credentials, bad request)
    #[error("Client error: {0}")]
    ClientError(u16),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Maximum retry attempts exceeded
    #[error("Maximum retry attempts exceeded after {attempts} attempts: {last}")]
    MaxRetriesExceeded { attempts: u32, last: String },

    /// Response body could not be decoded
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Whether the failure is transient (worth skipping the item and trying
    /// again on the next refresh cycle)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Http(_)
                | Self::RateLimited
                | Self::ServerError(_)
                | Self::Timeout
                | Self::MaxRetriesExceeded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_are_recoverable() {
        assert!(FetchError::Timeout.is_recoverable());
        assert!(FetchError::RateLimited.is_recoverable());
        assert!(FetchError::ServerError(503).is_recoverable());
        assert!(FetchError::MaxRetriesExceeded {
            attempts: 3,
            last: "timeout".to_string()
        }
        .is_recoverable());
    }

    #[test]
    fn test_permanent_errors_are_not_recoverable() {
        assert!(!FetchError::ClientError(401).is_recoverable());
        assert!(!FetchError::Decode("bad json".to_string()).is_recoverable());
        assert!(!FetchError::InvalidUrl("::".to_string()).is_recoverable());
    }

    #[test]
    fn test_max_retries_display() {
        let err = FetchError::MaxRetriesExceeded {
            attempts: 3,
            last: "Request timeout".to_string(),
        };
        assert!(err.to_string().contains("3 attempts"));
    }
}
