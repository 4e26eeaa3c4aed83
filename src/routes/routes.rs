//! Defines routes for the file API.
//!
//! ## Structure
//! - **Authenticated file endpoints**
//!   - `POST   /upload`: multipart upload (field `file`)
//!   - `GET    /files`: list the caller's files
//!   - `GET    /files/{id}`: file metadata
//!   - `GET    /files/{id}/download`: stream the payload as an attachment
//!   - `GET    /files/{id}/preview`: short-lived signed URL
//!   - `DELETE /files/{id}`: delete the metadata record
//!
//! - **Unauthenticated endpoints**
//!   - `GET /healthz`, `GET /readyz`: probes
//!   - `GET /objects/{*key}`: signed URLs of the local backend

use super::cors::cors_layer;
use crate::{
    handlers::{
        file_handlers::{
            delete_file, download_file, get_file, list_files, preview_file, upload_file,
        },
        health_handlers::{healthz, readyz},
        object_handlers::serve_signed_object,
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build the router. Uploads larger than `max_upload_bytes` are rejected
/// before they reach the file service; CORS applies to every route.
pub fn routes(max_upload_bytes: usize, cors_origins: &[String]) -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/upload",
            post(upload_file).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/files", get(list_files))
        .route("/files/{id}", get(get_file).delete(delete_file))
        .route("/files/{id}/download", get(download_file))
        .route("/files/{id}/preview", get(preview_file))
        .route("/objects/{*key}", get(serve_signed_object))
        .layer(cors_layer(cors_origins))
}
