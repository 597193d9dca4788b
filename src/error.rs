//! Error types for the Archive Backend

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::providers::ProviderError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Errors raised by the queue store
#[derive(Error, Debug)]
pub enum QueueError {
    /// No task is eligible for claiming. Control flow, not a fault.
    #[error("Queue is empty")]
    Empty,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("File already exists: {0}")]
    DuplicateFile(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Invalid transition for task {task_id}: {reason}")]
    InvalidTransition { task_id: i64, reason: String },

    /// The store faulted; the transaction was rolled back and may be retried
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt ledger data: {0}")]
    Corrupt(String),
}

impl QueueError {
    pub fn is_empty(&self) -> bool {
        matches!(self, QueueError::Empty)
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Queue(e) => match e {
                QueueError::Empty | QueueError::NotFound(_) => {
                    (StatusCode::NOT_FOUND, "not_found", e.to_string())
                }
                QueueError::DuplicateFile(hash) => (
                    StatusCode::CONFLICT,
                    "duplicate_file",
                    format!("File already submitted: {}", hash),
                ),
                QueueError::UnknownProvider(name) => (
                    StatusCode::BAD_REQUEST,
                    "unknown_provider",
                    format!("Unknown provider: {}", name),
                ),
                QueueError::InvalidTransition { .. } => {
                    (StatusCode::CONFLICT, "invalid_transition", e.to_string())
                }
                _ => {
                    tracing::error!("Queue error: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "database_error",
                        "Database error".to_string(),
                    )
                }
            },
            AppError::Provider(e) => {
                tracing::error!("Provider error: {}", e);
                match e {
                    ProviderError::BadOptions(msg) => {
                        (StatusCode::BAD_REQUEST, "bad_options", msg.clone())
                    }
                    ProviderError::InvalidCapability { .. } => {
                        (StatusCode::BAD_REQUEST, "invalid_capability", e.to_string())
                    }
                    _ => (
                        StatusCode::BAD_GATEWAY,
                        "provider_error",
                        "Provider error".to_string(),
                    ),
                }
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}
