//! filebox: authenticated file storage over an object store.
//!
//! Users upload files, list their own, fetch metadata, download or preview
//! them, and delete them. Payloads live in an object store (local disk or
//! S3); ownership and metadata live in SQLite.

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;
pub mod storage;

use axum::Router;
use state::AppState;

/// The complete application router with its state attached.
pub fn app(state: AppState, max_upload_bytes: usize, cors_origins: &[String]) -> Router {
    routes::routes::routes(max_upload_bytes, cors_origins).with_state(state)
}
