//! src/services/file_service.rs
//!
//! FileService: upload, list, get, download, preview and delete for the
//! authenticated caller. Metadata lives behind `FileRepository`, payloads
//! behind `ObjectStore`; both are injected at startup.
//!
//! Upload writes the payload first and the metadata row second, with no
//! transaction spanning the two. A failed metadata insert therefore leaves an
//! orphaned object unless `compensate_orphans` is enabled. Delete removes the
//! metadata row only; the payload stays in the object store.

use crate::{
    auth::Identity,
    errors::ServiceError,
    models::file_record::{FileRecord, NewFileRecord},
    repositories::file_repository::FileRepository,
    services::{
        access_guard::{Access, authorize},
        key_resolver::resolve_key,
    },
    storage::{ByteStream, ObjectStore, ObjectStoreError},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
    time::Duration,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifetime of preview URLs.
pub const PREVIEW_TTL: Duration = Duration::from_secs(300);

const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";
const FALLBACK_FILE_NAME: &str = "upload.bin";
/// Longest key the local backend can hold as a single file name.
const MAX_KEY_BYTES: usize = 255;
const MAX_KEY_ATTEMPTS: usize = 3;
/// Extensions up to this length survive key truncation.
const MAX_KEPT_EXTENSION: usize = 16;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// A file as received from the client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub media_type: Option<String>,
    pub data: Bytes,
}

/// An authorized download: the record plus a stream over its payload.
pub struct Download {
    pub record: FileRecord,
    pub body: ByteStream,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Preview {
    pub preview_url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct FileService {
    repo: Arc<dyn FileRepository>,
    store: Arc<dyn ObjectStore>,
    compensate_orphans: bool,
    last_token: Arc<AtomicI64>,
}

impl FileService {
    pub fn new(repo: Arc<dyn FileRepository>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            repo,
            store,
            compensate_orphans: false,
            last_token: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Delete the freshly written object when its metadata insert fails.
    pub fn with_orphan_compensation(mut self, enabled: bool) -> Self {
        self.compensate_orphans = enabled;
        self
    }

    /// Millisecond timestamp, bumped past the previous token when two uploads
    /// land in the same millisecond.
    fn next_token(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last_token.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self.last_token.compare_exchange_weak(
                last,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    /// `{token}-{file name}`; path separators in the name are flattened and
    /// the whole key stays within one file-name component.
    fn object_key(&self, file_name: &str) -> String {
        let name: String = file_name
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        let prefix = format!("{}-", self.next_token());
        let name = fit_name(&name, MAX_KEY_BYTES.saturating_sub(prefix.len()));
        prefix + &name
    }

    pub async fn upload(
        &self,
        identity: &Identity,
        file: Option<UploadedFile>,
    ) -> ServiceResult<FileRecord> {
        let file = file
            .filter(|file| !file.data.is_empty())
            .ok_or(ServiceError::NoFileSupplied)?;

        let file_name = if file.file_name.trim().is_empty() {
            FALLBACK_FILE_NAME.to_string()
        } else {
            file.file_name
        };
        let media_type = file
            .media_type
            .filter(|media_type| !media_type.is_empty())
            .unwrap_or_else(|| DEFAULT_MEDIA_TYPE.to_string());
        let size = file.data.len() as i64;

        // A taken key (clock stepped back across a restart) gets a fresh token.
        let mut attempts = 1;
        let (key, location) = loop {
            let key = self.object_key(&file_name);
            match self.store.put(&key, file.data.clone(), Some(&media_type)).await {
                Ok(location) => break (key, location),
                Err(ObjectStoreError::AlreadyExists(_)) if attempts < MAX_KEY_ATTEMPTS => {
                    warn!(key = %key, "object key already taken; retrying with a new token");
                    attempts += 1;
                }
                Err(err) => return Err(ServiceError::StoreWriteFailed(err)),
            }
        };

        let new_record = NewFileRecord {
            file_name,
            location,
            size,
            media_type,
            owner_id: identity.as_str().to_string(),
        };

        match self.repo.insert(new_record).await {
            Ok(record) => {
                info!(file_id = %record.id, owner = %identity, size, "file uploaded");
                Ok(record)
            }
            Err(err) => {
                if self.compensate_orphans {
                    match self.store.delete(&key).await {
                        Ok(()) => info!(key = %key, "removed orphaned object after metadata failure"),
                        Err(cleanup) => warn!(key = %key, "orphaned object left behind: {}", cleanup),
                    }
                } else {
                    warn!(key = %key, "metadata insert failed; stored object is orphaned");
                }
                Err(ServiceError::MetadataWriteFailed(err))
            }
        }
    }

    pub async fn list(&self, identity: &Identity) -> ServiceResult<Vec<FileRecord>> {
        self.repo
            .find_by_owner(identity.as_str())
            .await
            .map_err(ServiceError::MetadataReadFailed)
    }

    /// Look the record up and apply the ownership check.
    pub async fn get(&self, identity: &Identity, id: Uuid) -> ServiceResult<FileRecord> {
        let record = self
            .repo
            .find_by_id(id)
            .await
            .map_err(ServiceError::MetadataReadFailed)?
            .ok_or_else(|| {
                debug!(file_id = %id, "file not found");
                ServiceError::NotFound
            })?;

        match authorize(&record, identity) {
            Access::Allowed => Ok(record),
            Access::Denied => {
                warn!(file_id = %id, requester = %identity, "access denied");
                Err(ServiceError::AccessDenied)
            }
        }
    }

    pub async fn download(&self, identity: &Identity, id: Uuid) -> ServiceResult<Download> {
        let record = self.get(identity, id).await?;
        let key = self.key_for(&record)?;
        let body = self
            .store
            .get_stream(&key)
            .await
            .map_err(ServiceError::StoreReadFailed)?;
        Ok(Download { record, body })
    }

    pub async fn preview(&self, identity: &Identity, id: Uuid) -> ServiceResult<Preview> {
        let record = self.get(identity, id).await?;
        let key = self.key_for(&record)?;
        let signed = self
            .store
            .sign(&key, PREVIEW_TTL, &record.media_type)
            .await
            .map_err(ServiceError::SignFailed)?;
        Ok(Preview {
            preview_url: signed.url,
            expires_at: signed.expires_at,
        })
    }

    /// Removes the metadata row; the stored payload is kept.
    pub async fn delete(&self, identity: &Identity, id: Uuid) -> ServiceResult<()> {
        self.get(identity, id).await?;
        let removed = self
            .repo
            .delete_by_id(id)
            .await
            .map_err(ServiceError::MetadataDeleteFailed)?;
        if !removed {
            // Deleted concurrently between lookup and delete.
            return Err(ServiceError::NotFound);
        }
        info!(file_id = %id, owner = %identity, "file deleted");
        Ok(())
    }

    fn key_for(&self, record: &FileRecord) -> ServiceResult<String> {
        resolve_key(&record.location).map_err(|err| {
            tracing::error!(file_id = %record.id, "{}", err);
            ServiceError::MalformedLocation
        })
    }
}

/// Cut `name` to at most `budget` bytes on a char boundary, keeping a short
/// extension when there is one.
fn fit_name(name: &str, budget: usize) -> String {
    if name.len() <= budget {
        return name.to_string();
    }
    let (stem, extension) = match name.rfind('.') {
        Some(dot) if dot > 0 && name.len() - dot <= MAX_KEPT_EXTENSION.min(budget) => {
            name.split_at(dot)
        }
        _ => (name, ""),
    };
    let mut cut = budget - extension.len();
    while !stem.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &stem[..cut], extension)
}
