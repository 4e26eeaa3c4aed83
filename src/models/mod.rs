//! Data models persisted by the metadata store.
//!
//! They map to database rows via `sqlx::FromRow` and serialize as camelCase
//! JSON via `serde`.

pub mod file_record;
