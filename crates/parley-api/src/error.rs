//! API error types.
//!
//! Every failure is rendered as `{"success": false, "error": "...", "code": "..."}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use parley_avatar::AvatarError;
use parley_db::DbError;
use parley_models::InvalidTransition;
use parley_pipeline::PipelineError;
use parley_storage::StorageError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    PaymentRequired(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Provider error: {0}")]
    Avatar(#[from] AvatarError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Storage(e) => storage_status(e),
            ApiError::Db(DbError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Avatar(e) => avatar_status(e),
            ApiError::Pipeline(e) => pipeline_status(e),
        }
    }

    /// Machine-readable error code for clients.
    pub fn code(&self) -> &'static str {
        match self.status_code() {
            StatusCode::BAD_REQUEST => "bad_request",
            StatusCode::NOT_FOUND => "not_found",
            StatusCode::PAYMENT_REQUIRED => "payment_required",
            StatusCode::TOO_MANY_REQUESTS => "rate_limited",
            StatusCode::BAD_GATEWAY => "upstream_error",
            _ => "internal_error",
        }
    }
}

fn storage_status(e: &StorageError) -> StatusCode {
    match e {
        StorageError::InvalidDataUrl(_) => StatusCode::BAD_REQUEST,
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn avatar_status(e: &AvatarError) -> StatusCode {
    match e {
        AvatarError::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
        AvatarError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        AvatarError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn pipeline_status(e: &PipelineError) -> StatusCode {
    match e {
        PipelineError::MalformedAudio(_) => StatusCode::BAD_REQUEST,
        PipelineError::Avatar(inner) => avatar_status(inner),
        PipelineError::Storage(inner) => storage_status(inner),
        PipelineError::Function { status, .. } => match *status {
            400 | 402 | 404 | 429 => StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
            _ => StatusCode::BAD_GATEWAY,
        },
        PipelineError::Network(_) | PipelineError::UnexpectedResponse(_) | PipelineError::Preload(_) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<InvalidTransition> for ApiError {
    fn from(e: InvalidTransition) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("serialization failed: {}", e))
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let error = if status == StatusCode::INTERNAL_SERVER_ERROR
            && std::env::var("ENVIRONMENT").is_ok_and(|env| env.eq_ignore_ascii_case("production"))
        {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            success: false,
            error,
            code: self.code(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_errors_keep_their_meaning() {
        let quota: ApiError = AvatarError::from_status(402, "out of credits").into();
        assert_eq!(quota.status_code(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(quota.code(), "payment_required");

        let limited: ApiError = PipelineError::Avatar(AvatarError::from_status(429, "slow down")).into();
        assert_eq!(limited.status_code(), StatusCode::TOO_MANY_REQUESTS);

        let upstream: ApiError = AvatarError::from_status(503, "down").into();
        assert_eq!(upstream.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_function_status_passthrough() {
        let err: ApiError = PipelineError::Function {
            status: 404,
            message: "Job not found".into(),
            code: None,
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err: ApiError = PipelineError::Function {
            status: 500,
            message: "boom".into(),
            code: None,
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_invalid_data_url_is_a_client_error() {
        let err: ApiError = StorageError::invalid_data_url("missing comma").into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::bad_request("x").code(), "bad_request");
    }
}
