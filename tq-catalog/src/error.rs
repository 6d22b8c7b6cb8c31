//! Error types for the tq-catalog HTTP surface
//!
//! Core errors map onto status codes by variant: validation 400, missing 404,
//! concurrency 409, everything else 500.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. lost version race or reconciliation already running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<tq_common::Error> for ApiError {
    fn from(err: tq_common::Error) -> Self {
        use tq_common::Error;

        match err {
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::Validation(msg) => ApiError::BadRequest(msg),
            Error::ConcurrencyConflict(msg) => ApiError::Conflict(msg),
            other => {
                error!(error = %other, "Request failed with internal error");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_by_variant() {
        let cases = [
            (tq_common::Error::NotFound("x".into()), StatusCode::NOT_FOUND),
            (tq_common::Error::Validation("x".into()), StatusCode::BAD_REQUEST),
            (tq_common::Error::ConcurrencyConflict("x".into()), StatusCode::CONFLICT),
            (tq_common::Error::IntegrityViolation("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (tq_common::Error::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
