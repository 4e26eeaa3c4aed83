//! Metadata store for `FileRecord`s.
//!
//! `FileRepository` is the narrow interface the file service consumes;
//! `SqliteFileRepository` is the production implementation on top of a sqlx
//! SQLite pool.

use crate::models::file_record::{FileRecord, NewFileRecord};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::{path::Path, str::FromStr, time::Duration};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait FileRepository: Send + Sync {
    /// Persist a new record and return it with its assigned id and timestamps.
    async fn insert(&self, record: NewFileRecord) -> RepositoryResult<FileRecord>;

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<FileRecord>>;

    /// All records owned by `owner_id`, oldest first.
    async fn find_by_owner(&self, owner_id: &str) -> RepositoryResult<Vec<FileRecord>>;

    /// Remove a record. Returns `false` when no row matched.
    async fn delete_by_id(&self, id: Uuid) -> RepositoryResult<bool>;
}

/// Open a SQLite pool for `database_url`, creating the file and its parent
/// directory when missing.
pub async fn connect(database_url: &str) -> RepositoryResult<SqlitePool> {
    let is_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

    if !is_memory {
        let db_path = database_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:")
            .trim_start_matches("file:");
        let db_path = db_path.split('?').next().unwrap_or(db_path);
        debug!("Interpreted SQLite path => {}", db_path);

        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
    }

    let options = sqlx::sqlite::SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    // Every connection to `:memory:` is its own database; keep one.
    let max_connections = if is_memory { 1 } else { 5 };

    let mut pool_options = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10));
    if is_memory {
        pool_options = pool_options.idle_timeout(None).max_lifetime(None);
    }

    let pool = pool_options
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Apply the embedded migrations under `migrations/`.
pub async fn run_migrations(pool: &SqlitePool) -> RepositoryResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Clone, Debug)]
pub struct SqliteFileRepository {
    pool: SqlitePool,
}

impl SqliteFileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FileRepository for SqliteFileRepository {
    async fn insert(&self, record: NewFileRecord) -> RepositoryResult<FileRecord> {
        let now = Utc::now();
        let inserted = sqlx::query_as::<_, FileRecord>(
            r#"
            INSERT INTO files (
                id, file_name, location, size, media_type, owner_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, file_name, location, size, media_type, owner_id, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&record.file_name)
        .bind(&record.location)
        .bind(record.size)
        .bind(&record.media_type)
        .bind(&record.owner_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(inserted)
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>(
            "SELECT id, file_name, location, size, media_type, owner_id, created_at, updated_at
             FROM files WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn find_by_owner(&self, owner_id: &str) -> RepositoryResult<Vec<FileRecord>> {
        let records = sqlx::query_as::<_, FileRecord>(
            "SELECT id, file_name, location, size, media_type, owner_id, created_at, updated_at
             FROM files WHERE owner_id = ? ORDER BY rowid ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn delete_by_id(&self, id: Uuid) -> RepositoryResult<bool> {
        let result = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
