//! Database error types.

use thiserror::Error;

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Row not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited, retry after {0}ms")]
    RateLimited(u64),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DbError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    /// Map a non-2xx status to an error.
    pub fn from_http_status(status: u16, msg: impl Into<String>) -> Self {
        Self::from_response(status, None, msg)
    }

    /// Map a non-2xx status, honouring a `Retry-After` value in seconds.
    pub fn from_response(status: u16, retry_after_secs: Option<u64>, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        match status {
            401 | 403 => Self::PermissionDenied(msg),
            404 => Self::NotFound(msg),
            409 => Self::Conflict(msg),
            429 => Self::RateLimited(retry_after_secs.map_or(1000, |s| s * 1000)),
            500..=599 => Self::ServerError(status, msg),
            _ => Self::RequestFailed(msg),
        }
    }

    /// HTTP status this error corresponds to, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            DbError::PermissionDenied(_) => Some(403),
            DbError::NotFound(_) => Some(404),
            DbError::Conflict(_) => Some(409),
            DbError::RateLimited(_) => Some(429),
            DbError::ServerError(code, _) => Some(*code),
            DbError::RequestFailed(_) => Some(400),
            _ => None,
        }
    }

    /// Delay requested by the server.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            DbError::RateLimited(ms) => Some(*ms),
            _ => None,
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DbError::Network(_) | DbError::RateLimited(_) | DbError::ServerError(_, _)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_from_http_status() {
        assert!(matches!(DbError::from_http_status(404, "x"), DbError::NotFound(_)));
        assert!(matches!(DbError::from_http_status(409, "x"), DbError::Conflict(_)));
        assert!(matches!(DbError::from_http_status(400, "x"), DbError::RequestFailed(_)));
        assert!(matches!(DbError::from_http_status(503, "x"), DbError::ServerError(503, _)));
    }

    #[test]
    fn test_retryable() {
        assert!(DbError::from_http_status(500, "x").is_retryable());
        assert!(DbError::RateLimited(10).is_retryable());
        assert!(!DbError::from_http_status(409, "x").is_retryable());
        assert!(!DbError::from_http_status(401, "x").is_retryable());
    }

    #[test]
    fn test_retry_after() {
        let err = DbError::from_response(429, Some(2), "slow down");
        assert_eq!(err.retry_after_ms(), Some(2000));
        assert_eq!(err.http_status(), Some(429));
        assert_eq!(DbError::from_http_status(429, "x").retry_after_ms(), Some(1000));
    }
}
