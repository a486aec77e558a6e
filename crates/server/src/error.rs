//! API error types.

use crate::handlers::common::Alert;
use crate::metrics;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use keel_metadata::MetadataError;
use serde::Serialize;

/// API error response.
///
/// Errors use the same alert list as successful responses, plus a stable
/// code for programmatic handling.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Exactly one error-level alert with the human-readable message.
    pub alerts: Vec<Alert>,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    /// Role-based denial, or releasing a lock someone else holds.
    #[error("{0}")]
    Forbidden(String),

    /// A hard CDN lock held by another user blocked the mutation.
    #[error("{0}")]
    Locked(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PreconditionFailed(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::Locked(_) => "cdn_locked",
            Self::Conflict(_) => "conflict",
            Self::PreconditionFailed(_) => "precondition_failed",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::Locked(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<MetadataError> for ApiError {
    fn from(e: MetadataError) -> Self {
        match e {
            MetadataError::NotFound(msg) => Self::NotFound(msg),
            MetadataError::Invalid(msg) => Self::BadRequest(msg),
            MetadataError::AlreadyExists(msg) => Self::Conflict(msg),
            MetadataError::Conflict(msg) => Self::Conflict(msg),
            MetadataError::Forbidden(msg) => Self::Forbidden(msg),
            e @ MetadataError::Locked { .. } => Self::Locked(e.to_string()),
            MetadataError::PreconditionFailed(msg) => Self::PreconditionFailed(msg),
            e @ (MetadataError::Database(_)
            | MetadataError::Config(_)
            | MetadataError::Internal(_)) => Self::Internal(e.to_string()),
        }
    }
}

impl From<keel_core::Error> for ApiError {
    fn from(e: keel_core::Error) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            Self::Locked(_) => metrics::LOCK_REJECTIONS.inc(),
            Self::PreconditionFailed(_) => metrics::PRECONDITION_FAILURES.inc(),
            Self::Internal(msg) => tracing::error!(error = %msg, "Request failed"),
            _ => {}
        }

        // Storage details stay in the log.
        let text = match &self {
            Self::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        };
        let body = ErrorResponse {
            code: self.code().to_string(),
            alerts: vec![Alert::error(text)],
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
