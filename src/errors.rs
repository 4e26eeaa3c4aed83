use crate::{auth::AuthError, repositories::file_repository::RepositoryError, storage::ObjectStoreError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::{error::Error as _, fmt};
use thiserror::Error;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

/// Terminal outcomes of a file operation. Messages are safe to show to the
/// caller; server-side causes travel as `source` and are only logged.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("authentication required")]
    Unauthenticated(#[source] AuthError),
    #[error("file not found")]
    NotFound,
    #[error("access denied")]
    AccessDenied,
    #[error("no file uploaded")]
    NoFileSupplied,
    #[error("invalid upload: {0}")]
    InvalidUpload(String),
    #[error("stored file location is malformed")]
    MalformedLocation,
    #[error("failed to store file")]
    StoreWriteFailed(#[source] ObjectStoreError),
    #[error("failed to read file")]
    StoreReadFailed(#[source] ObjectStoreError),
    #[error("failed to save file metadata")]
    MetadataWriteFailed(#[source] RepositoryError),
    #[error("failed to read file metadata")]
    MetadataReadFailed(#[source] RepositoryError),
    #[error("failed to delete file metadata")]
    MetadataDeleteFailed(#[source] RepositoryError),
    #[error("failed to create preview url")]
    SignFailed(#[source] ObjectStoreError),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ServiceError::NotFound => StatusCode::NOT_FOUND,
            ServiceError::AccessDenied => StatusCode::FORBIDDEN,
            ServiceError::NoFileSupplied | ServiceError::InvalidUpload(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::MalformedLocation
            | ServiceError::StoreWriteFailed(_)
            | ServiceError::StoreReadFailed(_)
            | ServiceError::MetadataWriteFailed(_)
            | ServiceError::MetadataReadFailed(_)
            | ServiceError::MetadataDeleteFailed(_)
            | ServiceError::SignFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let status = err.status();
        if status.is_server_error() {
            match err.source() {
                Some(cause) => tracing::error!("{}: {}", err, cause),
                None => tracing::error!("{}", err),
            }
        }
        AppError::new(status, err.to_string())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        AppError::from(self).into_response()
    }
}
