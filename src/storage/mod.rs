//! Object-store clients.
//!
//! `ObjectStore` is the narrow interface the file service talks to: write
//! bytes under a key and get back a locator, open a byte stream for a key,
//! and issue time-limited signed URLs. Two implementations exist:
//!
//! - [`local::LocalObjectStore`] keeps payloads on disk and signs URLs that
//!   this process serves itself.
//! - [`s3::S3ObjectStore`] talks to an S3 bucket through `aws-sdk-s3`.

pub mod local;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::{io, pin::Pin, time::Duration};
use thiserror::Error;

/// A boxed stream of payload bytes.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Characters left unescaped when a key is embedded in a locator path.
const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("invalid object key")]
    InvalidKey,
    #[error("object `{0}` already exists")]
    AlreadyExists(String),
    #[error("signature is invalid")]
    InvalidSignature,
    #[error("signed url has expired")]
    Expired,
    #[error("object store backend error: {0}")]
    Backend(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;

/// A time-limited URL granting direct read access to one object.
#[derive(Debug, Clone)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key` and return the locator of the written object.
    /// An existing object under `key` is never replaced (`AlreadyExists`).
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> ObjectStoreResult<String>;

    /// Open a stream over the object's bytes.
    async fn get_stream(&self, key: &str) -> ObjectStoreResult<ByteStream>;

    /// Issue a URL that renders the object inline as `content_type` until
    /// `expires_in` has elapsed.
    async fn sign(
        &self,
        key: &str,
        expires_in: Duration,
        content_type: &str,
    ) -> ObjectStoreResult<SignedUrl>;

    /// Remove an object. Missing objects are not an error.
    async fn delete(&self, key: &str) -> ObjectStoreResult<()>;

    /// Cheap reachability check for readiness probes.
    async fn probe(&self) -> ObjectStoreResult<()>;
}

/// Percent-encode `key` for use as a locator path, keeping `/` separators.
pub fn encode_key(key: &str) -> String {
    utf8_percent_encode(key, KEY_SEGMENT).to_string()
}
