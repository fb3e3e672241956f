use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::screening::guard::GuardError;
use crate::screening::pipeline::ScreeningError;
use crate::storage::FileStoreError;
use crate::store::StoreError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Guard error: {0}")]
    Guard(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Database(e) => AppError::Database(e),
            StoreError::DuplicateJob(name) => {
                AppError::Conflict(format!("Job '{name}' already exists"))
            }
            StoreError::Rejected(msg) => AppError::Store(msg),
        }
    }
}

impl From<GuardError> for AppError {
    fn from(e: GuardError) -> Self {
        AppError::Guard(e.to_string())
    }
}

impl From<FileStoreError> for AppError {
    fn from(e: FileStoreError) -> Self {
        match e {
            FileStoreError::NotFound(path) => AppError::NotFound(format!("File {path} not found")),
            other => AppError::Storage(other.to_string()),
        }
    }
}

impl From<ScreeningError> for AppError {
    fn from(e: ScreeningError) -> Self {
        match e {
            ScreeningError::UnknownJob(name) => AppError::NotFound(format!("Job '{name}' not found")),
            ScreeningError::EmptyUpload => {
                AppError::Validation("Upload at least one résumé file".to_string())
            }
            ScreeningError::Store(e) => e.into(),
            ScreeningError::Guard(e) => e.into(),
            ScreeningError::Files(e) => e.into(),
            ScreeningError::Interrupted(msg) => AppError::Internal(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Store(msg) => {
                tracing::error!("Store error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORE_ERROR",
                    "A persistence error occurred".to_string(),
                )
            }
            AppError::Guard(msg) => {
                tracing::error!("Guard error: {msg}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "GUARD_ERROR",
                    "Batch state is temporarily unavailable".to_string(),
                )
            }
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "The batch was interrupted".to_string(),
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
