//! Pipeline error types.

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Malformed audio: {0}")]
    MalformedAudio(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Key already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Edge function returned {status}: {message}")]
    Function {
        status: u16,
        message: String,
        code: Option<String>,
    },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Preload failed: {0}")]
    Preload(String),

    #[error("Avatar error: {0}")]
    Avatar(#[from] parley_avatar::AvatarError),

    #[error("Storage error: {0}")]
    Storage(#[from] parley_storage::StorageError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn malformed_audio(msg: impl Into<String>) -> Self {
        Self::MalformedAudio(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn preload(msg: impl Into<String>) -> Self {
        Self::Preload(msg.into())
    }

    /// Transient failures worth another poll.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Avatar(e) => e.is_retryable(),
            PipelineError::Network(_) => true,
            PipelineError::Function { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<hound::Error> for PipelineError {
    fn from(e: hound::Error) -> Self {
        Self::MalformedAudio(e.to_string())
    }
}
