//! Metadata for one uploaded file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A stored file's metadata record.
///
/// The record never holds payload bytes. `location` is the full locator the
/// object store returned when the bytes were written; the store key is derived
/// from it on every access.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// Assigned by the metadata store at insert.
    pub id: Uuid,

    /// Original client-supplied display name.
    pub file_name: String,

    /// Locator returned by the object store at upload time.
    pub location: String,

    /// Size in bytes.
    pub size: i64,

    /// Client-supplied content type.
    pub media_type: String,

    /// Identity of the uploader; the only field consulted for authorization.
    pub owner_id: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied by the caller when creating a record.
#[derive(Clone, Debug)]
pub struct NewFileRecord {
    pub file_name: String,
    pub location: String,
    pub size: i64,
    pub media_type: String,
    pub owner_id: String,
}
