//! Serves signed URLs issued by the local object store.
//!
//! `GET /objects/{*key}?expires=&content_type=&signature=` streams the payload
//! inline with the signed content type. The S3 backend never routes here; its
//! presigned URLs point at the bucket directly.

use super::content_disposition;
use crate::{errors::AppError, state::AppState, storage::ObjectStore, storage::ObjectStoreError};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct SignedObjectQuery {
    pub expires: i64,
    pub content_type: String,
    pub signature: String,
}

pub async fn serve_signed_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(q): Query<SignedObjectQuery>,
) -> Result<Response, AppError> {
    let store = state
        .local_store
        .as_ref()
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, "not found"))?;

    store
        .verify(&key, q.expires, &q.content_type, &q.signature, Utc::now())
        .map_err(|err| {
            debug!(key = %key, "signed url rejected: {}", err);
            AppError::new(StatusCode::FORBIDDEN, "invalid or expired signature")
        })?;

    let stream = store.get_stream(&key).await.map_err(|err| match err {
        ObjectStoreError::NotFound(_) | ObjectStoreError::InvalidKey => {
            AppError::new(StatusCode::NOT_FOUND, "not found")
        }
        other => {
            tracing::error!(key = %key, "failed to open signed object: {}", other);
            AppError::internal("failed to read file")
        }
    })?;

    let file_name = key.rsplit('/').next().unwrap_or(&key).to_string();
    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&q.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        content_disposition("inline", &file_name),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("private, no-store"));

    Ok(response)
}
