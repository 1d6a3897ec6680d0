//! Avatar provider error types.

use thiserror::Error;

pub type AvatarResult<T> = Result<T, AvatarError>;

#[derive(Debug, Error)]
pub enum AvatarError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Payment required: {0}")]
    PaymentRequired(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Provider returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Unexpected provider response: {0}")]
    UnexpectedResponse(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AvatarError {
    /// Map a non-2xx provider status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            402 => Self::PaymentRequired(message),
            429 => Self::RateLimited(message),
            _ => Self::Upstream { status, message },
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            AvatarError::Network(_) => true,
            AvatarError::Upstream { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// True when the request never reached the provider.
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, AvatarError::Network(e) if e.is_connect())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for AvatarError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Stream(e.to_string())
    }
}
