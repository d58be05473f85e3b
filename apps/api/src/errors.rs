use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;
use crate::sync::SyncError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::NotFound(id) => AppError::NotFound(format!("Connection {id} not found")),
            SyncError::Inactive(id) => {
                AppError::Validation(format!("Connection {id} is not active"))
            }
            SyncError::Credential(msg) => AppError::Credential(msg),
            SyncError::Gateway(msg) => AppError::Gateway(msg),
            SyncError::Store(e) => AppError::Store(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Credential(msg) => {
                tracing::warn!("Credential error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "CREDENTIAL_ERROR",
                    "Mailbox authorization failed".to_string(),
                )
            }
            AppError::Gateway(msg) => {
                tracing::error!("Gateway error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "GATEWAY_ERROR",
                    "The mailbox provider returned an error".to_string(),
                )
            }
            AppError::Store(e) => {
                tracing::error!("Store error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORE_ERROR",
                    "A storage error occurred".to_string(),
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
