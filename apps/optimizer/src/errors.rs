use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::lifecycle::{ResetError, SubmitError};

/// Error type of the local web surface.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<SubmitError> for AppError {
    fn from(e: SubmitError) -> Self {
        let message = e.to_string();
        match e {
            SubmitError::Validation(_) => AppError::Validation(message),
            SubmitError::Busy => AppError::Conflict(message),
            SubmitError::Transport(_) => AppError::Upstream(message),
            SubmitError::Disposed => AppError::Unavailable(message),
        }
    }
}

impl From<ResetError> for AppError {
    fn from(e: ResetError) -> Self {
        let message = e.to_string();
        match e {
            ResetError::Busy => AppError::Conflict(message),
            ResetError::Disposed => AppError::Unavailable(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::Upstream(msg) => {
                tracing::warn!("Upstream error: {msg}");
                (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg.clone())
            }
            AppError::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "UNAVAILABLE",
                msg.clone(),
            ),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::optimization::ValidationError;
    use crate::optimize_client::ApiError;

    #[test]
    fn test_submit_errors_map_to_status_codes() {
        let cases = [
            (
                AppError::from(SubmitError::Validation(ValidationError::EmptyResume)),
                StatusCode::BAD_REQUEST,
            ),
            (AppError::from(SubmitError::Busy), StatusCode::CONFLICT),
            (
                AppError::from(SubmitError::Transport(ApiError::Api {
                    status: 500,
                    message: "boom".to_string(),
                })),
                StatusCode::BAD_GATEWAY,
            ),
            (
                AppError::from(SubmitError::Disposed),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_validation_message_is_kept() {
        let error = AppError::from(SubmitError::Validation(ValidationError::EmptyJobDescription));
        assert_eq!(
            error.to_string(),
            "Validation error: job_description cannot be empty"
        );
    }

    #[test]
    fn test_reset_busy_is_conflict() {
        let response = AppError::from(ResetError::Busy).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
