use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::controller::IntakeError;
use crate::error::OrchestratorError;

/// API error types that can be returned from handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Collaborator error: {0}")]
    CollaboratorError(String),
}

/// Error response that gets serialized to JSON
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl ApiError {
    /// HTTP status and the machine-readable `error` field
    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BadRequest"),
            ApiError::ValidationError(_) => (StatusCode::BAD_REQUEST, "ValidationError"),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "Conflict"),
            ApiError::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError"),
            ApiError::StorageError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "StorageError"),
            ApiError::CollaboratorError(_) => (StatusCode::BAD_GATEWAY, "CollaboratorError"),
            ApiError::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "ServiceUnavailable"),
        }
    }

    fn status_code(&self) -> StatusCode {
        self.classify().0
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.classify();

        let message = match &self {
            ApiError::InternalError(_) | ApiError::StorageError(_) => {
                tracing::error!(error = %self, "request failed on storage or internal error");
                "internal error, see server logs".to_string()
            }
            ApiError::ServiceUnavailable(_) | ApiError::CollaboratorError(_) => {
                tracing::warn!(error = %self, "downstream unavailable");
                self.to_string()
            }
            _ => {
                tracing::debug!(error = %self, "request rejected");
                self.to_string()
            }
        };

        let error_response = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(error: OrchestratorError) -> Self {
        match error {
            OrchestratorError::Storage(_) => ApiError::StorageError(error.to_string()),
            OrchestratorError::ProcessNotFound(_) | OrchestratorError::MergeNotFound(_) => {
                ApiError::NotFound(error.to_string())
            }
            OrchestratorError::MergeNotReady { .. } => ApiError::Conflict(error.to_string()),
            OrchestratorError::InvalidScenarioTime(_) => ApiError::BadRequest(error.to_string()),
            OrchestratorError::InvalidProcessConfig { .. }
            | OrchestratorError::MergeTaskAborted { .. } => ApiError::InternalError(error.to_string()),
            OrchestratorError::Collaborator(_) => ApiError::CollaboratorError(error.to_string()),
        }
    }
}

impl From<IntakeError> for ApiError {
    fn from(error: IntakeError) -> Self {
        ApiError::ServiceUnavailable(error.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        ApiError::InternalError(error.to_string())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(errors.to_string())
    }
}
