use thiserror::Error;

/// Application-wide error types for crmsync.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request to the CRM failed before a response code was available.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Reading from the commerce item source failed.
    #[error("Source error: {0}")]
    SourceError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A compare-and-set on an export state record lost against a concurrent writer.
    #[error("Export state for '{0}' was modified concurrently")]
    StateConflict(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_)
            | AppError::Timeout(_)
            | AppError::RateLimitExceeded
            | AppError::DatabaseError(_)
            | AppError::StateConflict(_) => true,
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(AppError::NetworkError("reset".into()).is_retryable());
        assert!(AppError::Timeout(30).is_retryable());
        assert!(AppError::RateLimitExceeded.is_retryable());
        assert!(AppError::DatabaseError("pool timed out".into()).is_retryable());
        assert!(AppError::StateConflict("product".into()).is_retryable());
        assert!(AppError::HttpError("connection reset by peer".into()).is_retryable());
    }

    #[test]
    fn test_permanent_errors() {
        assert!(!AppError::ConfigError("missing".into()).is_retryable());
        assert!(!AppError::SourceError("bad line".into()).is_retryable());
        assert!(!AppError::HttpError("invalid header".into()).is_retryable());
        assert!(!AppError::Generic("nope".into()).is_retryable());
    }

    #[test]
    fn test_state_conflict_message_names_data_type() {
        let err = AppError::StateConflict("customer".into());
        assert_eq!(
            err.to_string(),
            "Export state for 'customer' was modified concurrently"
        );
    }
}
