use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::UnprocessableEntity(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNPROCESSABLE_ENTITY",
                msg.clone(),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::ServiceUnavailable(msg) => {
                tracing::warn!("Provider unavailable: {msg}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "PROVIDER_UNAVAILABLE",
                    "An AI provider is temporarily unavailable".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
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

/// Typed outcome of every pipeline component below the task runner.
///
/// Components never return partial data on failure; they return one of these
/// and the task runner alone decides between retry and terminal failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// Empty or unparseable input document. Terminal.
    #[error("input unavailable: {0}")]
    InputUnavailable(String),

    /// Embedding / extraction provider failed or timed out. Retryable.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// A referenced entity no longer exists. Terminal, surfaced to the caller.
    #[error("data inconsistency: {0}")]
    DataInconsistency(String),

    /// Duplicate in-flight work for the same target. Rejected, never queued.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// Persistence layer failure. Retryable.
    #[error("storage error: {0}")]
    Storage(String),
}

impl PipelineError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::ProviderUnavailable(_) | PipelineError::Storage(_)
        )
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(e: sqlx::Error) -> Self {
        PipelineError::Storage(e.to_string())
    }
}

impl From<PipelineError> for AppError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::InputUnavailable(msg) => AppError::UnprocessableEntity(msg),
            PipelineError::ProviderUnavailable(msg) => AppError::ServiceUnavailable(msg),
            PipelineError::DataInconsistency(msg) => AppError::NotFound(msg),
            PipelineError::ConcurrencyConflict(msg) => AppError::Conflict(msg),
            PipelineError::Storage(msg) => AppError::Internal(anyhow::anyhow!(msg)),
        }
    }
}
