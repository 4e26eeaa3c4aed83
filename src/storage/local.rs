//! src/storage/local.rs
//!
//! LocalObjectStore: payloads on local disk, sharded beneath
//! `base_path/{bucket}/{shard}/{shard}/{key}`. Signed URLs point back at this
//! process (`GET /objects/{*key}`) and carry an HMAC-SHA256 signature over the
//! key, expiry and response content type.

use super::{ByteStream, ObjectStore, ObjectStoreError, ObjectStoreResult, SignedUrl, encode_key};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::Sha256;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const MAX_OBJECT_KEY_LEN: usize = 1024;
/// NAME_MAX on common filesystems; each key segment is one path component.
const MAX_SEGMENT_LEN: usize = 255;

#[derive(Clone)]
pub struct LocalObjectStore {
    /// Base directory on disk where object payloads are stored.
    base_path: PathBuf,
    bucket: String,
    /// Externally visible origin used when building signed URLs.
    public_url: String,
    signing_secret: Vec<u8>,
}

impl std::fmt::Debug for LocalObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalObjectStore")
            .field("base_path", &self.base_path)
            .field("bucket", &self.bucket)
            .field("public_url", &self.public_url)
            .finish_non_exhaustive()
    }
}

impl LocalObjectStore {
    pub fn new(
        base_path: impl Into<PathBuf>,
        bucket: impl Into<String>,
        public_url: impl Into<String>,
        signing_secret: impl AsRef<[u8]>,
    ) -> Self {
        Self {
            base_path: base_path.into(),
            bucket: bucket.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
            signing_secret: signing_secret.as_ref().to_vec(),
        }
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    fn ensure_key_safe(key: &str) -> ObjectStoreResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(ObjectStoreError::InvalidKey);
        }
        if key.starts_with('/') || key.split('/').any(|segment| segment == ".." || segment == ".") {
            return Err(ObjectStoreError::InvalidKey);
        }
        if key.split('/').any(|segment| segment.len() > MAX_SEGMENT_LEN) {
            return Err(ObjectStoreError::InvalidKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(ObjectStoreError::InvalidKey);
        }
        Ok(())
    }

    fn bucket_root(&self) -> PathBuf {
        self.base_path.join(&self.bucket)
    }

    /// Two-level shard directories from MD5(bucket/key), e.g. `3f/a0`.
    fn object_shards(&self, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", self.bucket, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = self.object_shards(key);
        let mut path = self.bucket_root();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    /// Locator recorded for `key`: `local://{bucket}/{encoded key}`.
    pub fn locator(&self, key: &str) -> String {
        format!("local://{}/{}", self.bucket, encode_key(key))
    }

    fn signature(&self, key: &str, expires: i64, content_type: &str) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.signing_secret)
            .expect("HMAC can accept any key length");
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        mac.update(b"\n");
        mac.update(content_type.as_bytes());
        mac
    }

    /// Check a signed URL's parameters against `now`.
    pub fn verify(
        &self,
        key: &str,
        expires: i64,
        content_type: &str,
        signature: &str,
        now: DateTime<Utc>,
    ) -> ObjectStoreResult<()> {
        if now.timestamp() >= expires {
            return Err(ObjectStoreError::Expired);
        }
        let provided = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| ObjectStoreError::InvalidSignature)?;
        self.signature(key, expires, content_type)
            .verify_slice(&provided)
            .map_err(|_| ObjectStoreError::InvalidSignature)
    }

    /// Remove empty shard directories up to the bucket root.
    async fn prune_empty_dirs(&self, start: &Path) {
        let stop = self.bucket_root();
        let mut current = start.to_path_buf();
        while current.starts_with(&stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    /// Write to a temp file, fsync, then link it into place. Linking fails
    /// instead of replacing an object that already holds the key.
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        _content_type: Option<&str>,
    ) -> ObjectStoreResult<String> {
        Self::ensure_key_safe(key)?;

        let file_path = self.object_path(key);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| io::Error::other("object path missing parent directory"))?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let written = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(&data).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::hard_link(&tmp_path, &file_path).await
        }
        .await;
        let _ = fs::remove_file(&tmp_path).await;

        match written {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(ObjectStoreError::AlreadyExists(key.to_string()));
            }
            Err(err) => return Err(ObjectStoreError::Io(err)),
        }

        debug!(key, bytes = data.len(), "stored object {}", file_path.display());
        Ok(self.locator(key))
    }

    async fn get_stream(&self, key: &str) -> ObjectStoreResult<ByteStream> {
        Self::ensure_key_safe(key)?;
        let file = File::open(self.object_path(key))
            .await
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => ObjectStoreError::NotFound(key.to_string()),
                _ => ObjectStoreError::Io(err),
            })?;
        Ok(Box::pin(ReaderStream::new(file)))
    }

    async fn sign(
        &self,
        key: &str,
        expires_in: Duration,
        content_type: &str,
    ) -> ObjectStoreResult<SignedUrl> {
        Self::ensure_key_safe(key)?;
        let ttl = chrono::Duration::from_std(expires_in)
            .map_err(|err| ObjectStoreError::Backend(err.to_string()))?;
        // Whole seconds, rounded down, so the advertised and enforced expiry agree.
        let expires = (Utc::now() + ttl).timestamp();
        let expires_at = DateTime::from_timestamp(expires, 0)
            .ok_or_else(|| ObjectStoreError::Backend("expiry out of range".into()))?;

        let signature =
            URL_SAFE_NO_PAD.encode(self.signature(key, expires, content_type).finalize().into_bytes());
        let url = format!(
            "{}/objects/{}?expires={}&content_type={}&signature={}",
            self.public_url,
            encode_key(key),
            expires,
            utf8_percent_encode(content_type, NON_ALPHANUMERIC),
            signature
        );

        Ok(SignedUrl { url, expires_at })
    }

    async fn delete(&self, key: &str) -> ObjectStoreResult<()> {
        Self::ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(ObjectStoreError::Io(err)),
        }
        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }

    /// Write, read back and remove a scratch file under the bucket root.
    async fn probe(&self) -> ObjectStoreResult<()> {
        let root = self.bucket_root();
        fs::create_dir_all(&root).await?;
        let tmp_path = root.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"readyz").await?;
        let read_back = fs::read(&tmp_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        if read_back? != b"readyz" {
            return Err(ObjectStoreError::Backend("file content mismatch".into()));
        }
        Ok(())
    }
}
