//! Error types for mauth-api
//!
//! Every core error kind maps to its own status and machine-readable code.
//! Body shape: `{"error": {"code": "...", "message": "..."}}`.

use axum::{
    extract::rejection::JsonRejection,
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
    /// Malformed request or trace (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Not enough usable training data (422)
    #[error("{0}")]
    InsufficientData(String),

    /// Training already running (409)
    #[error("{0}")]
    Conflict(String),

    /// No usable model artifact (503)
    #[error("{0}")]
    ModelNotTrained(String),

    /// Model fitting failed (500)
    #[error("{0}")]
    TrainingFailed(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<mauth_core::Error> for ApiError {
    fn from(err: mauth_core::Error) -> Self {
        use mauth_core::Error;

        let message = err.to_string();
        match err {
            Error::InvalidInput(_) => ApiError::BadRequest(message),
            Error::InsufficientData { .. } => ApiError::InsufficientData(message),
            Error::TrainingInProgress => ApiError::Conflict(message),
            Error::ModelNotTrained(_) => ApiError::ModelNotTrained(message),
            Error::TrainingFailed(_) => ApiError::TrainingFailed(message),
            Error::Io(_) | Error::Config(_) | Error::Internal(_) => ApiError::Internal(message),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            ApiError::InsufficientData(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_DATA"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "TRAINING_IN_PROGRESS"),
            ApiError::ModelNotTrained(_) => (StatusCode::SERVICE_UNAVAILABLE, "MODEL_NOT_TRAINED"),
            ApiError::TrainingFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "TRAINING_FAILED"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            ApiError::Other(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        if status.is_server_error() {
            error!(code = error_code, "{}", self);
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": self.to_string(),
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

    fn status_of(err: mauth_core::Error) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_core_error_statuses() {
        use mauth_core::Error;

        assert_eq!(status_of(Error::InvalidInput("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(Error::InsufficientData { found: 2, required: 3 }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status_of(Error::TrainingInProgress), StatusCode::CONFLICT);
        assert_eq!(
            status_of(Error::ModelNotTrained("none".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(Error::TrainingFailed("nan".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(status_of(Error::Internal("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
