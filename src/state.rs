//! Shared handler state, constructed once in `main`.

use crate::{
    auth::CredentialVerifier,
    services::file_service::FileService,
    storage::{ObjectStore, local::LocalObjectStore},
};
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub files: FileService,
    pub verifier: Arc<dyn CredentialVerifier>,
    /// Pool behind the metadata repository; used directly by readiness checks.
    pub db: SqlitePool,
    pub store: Arc<dyn ObjectStore>,
    /// Set only with the local backend, whose signed URLs this process serves.
    pub local_store: Option<Arc<LocalObjectStore>>,
}
