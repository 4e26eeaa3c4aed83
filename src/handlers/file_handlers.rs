//! HTTP handlers for the authenticated file API.
//! Download bodies are relayed as streams; nothing is buffered whole except
//! the single multipart upload field.

use super::content_disposition;
use crate::{
    auth::AuthUser,
    errors::ServiceError,
    models::file_record::FileRecord,
    services::file_service::{Download, Preview, UploadedFile},
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State, multipart::MultipartRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use uuid::Uuid;

const UPLOAD_FIELD: &str = "file";

/// Path ids that are not UUIDs cannot name a record.
fn parse_id(raw: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(raw).map_err(|_| ServiceError::NotFound)
}

/// `POST /upload`: multipart body with a single `file` field.
pub async fn upload_file(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let mut multipart =
        multipart.map_err(|rejection| ServiceError::InvalidUpload(rejection.body_text()))?;
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ServiceError::InvalidUpload(err.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD) || upload.is_some() {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let media_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|err| ServiceError::InvalidUpload(err.body_text()))?;
        upload = Some(UploadedFile {
            file_name,
            media_type,
            data,
        });
    }

    let record = state.files.upload(&identity, upload).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// `GET /files`: the caller's records.
pub async fn list_files(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<Vec<FileRecord>>, ServiceError> {
    Ok(Json(state.files.list(&identity).await?))
}

/// `GET /files/{id}`
pub async fn get_file(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<FileRecord>, ServiceError> {
    let id = parse_id(&id)?;
    Ok(Json(state.files.get(&identity, id).await?))
}

/// `GET /files/{id}/download`: payload as an attachment.
///
/// Once headers are sent the status can no longer change, so a failure in the
/// middle of the relay is logged and the body is cut short.
pub async fn download_file(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
) -> Result<Response, ServiceError> {
    let id = parse_id(&id)?;
    let Download { record, body } = state.files.download(&identity, id).await?;

    let file_id = record.id;
    let body = body.inspect_err(move |err| {
        tracing::error!(file_id = %file_id, "download relay failed: {}", err);
    });

    let mut response = Response::new(Body::from_stream(body));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&record.media_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(record.size.max(0) as u64),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        content_disposition("attachment", &record.file_name),
    );

    Ok(response)
}

/// `GET /files/{id}/preview`: short-lived signed URL for inline rendering.
pub async fn preview_file(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Preview>, ServiceError> {
    let id = parse_id(&id)?;
    Ok(Json(state.files.preview(&identity, id).await?))
}

/// `DELETE /files/{id}`: metadata only; the stored payload is kept.
pub async fn delete_file(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ServiceError> {
    let id = parse_id(&id)?;
    state.files.delete(&identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
