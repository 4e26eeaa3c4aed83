//! S3-backed object store using `aws-sdk-s3`.

use super::{ByteStream, ObjectStore, ObjectStoreError, ObjectStoreResult, SignedUrl, encode_key};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Region},
    error::DisplayErrorContext,
    presigning::PresigningConfig,
    primitives::ByteStream as SdkByteStream,
};
use bytes::Bytes;
use chrono::Utc;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    region: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            region: region.into(),
        }
    }

    /// Build a client from the ambient AWS configuration (env, profile, IMDS).
    ///
    /// A custom `endpoint_url` switches to path-style addressing, which
    /// S3-compatible servers such as MinIO expect.
    pub async fn from_env(
        bucket: impl Into<String>,
        region: impl Into<String>,
        endpoint_url: Option<String>,
    ) -> Self {
        let region = region.into();
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self::new(Client::from_conf(builder.build()), bucket, region)
    }

    /// Virtual-hosted locator, the same shape S3 reports as an upload's `Location`.
    pub fn locator(&self, key: &str) -> String {
        format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.bucket,
            self.region,
            encode_key(key)
        )
    }
}

fn backend_error<E>(err: E) -> ObjectStoreError
where
    E: std::error::Error,
{
    ObjectStoreError::Backend(DisplayErrorContext(err).to_string())
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> ObjectStoreResult<String> {
        let size = data.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .set_content_type(content_type.map(str::to_string))
            .if_none_match("*")
            .body(SdkByteStream::from(data))
            .send()
            .await
            .map_err(|err| {
                // 412: a conditional write lost to an existing object.
                if err.raw_response().map(|raw| raw.status().as_u16()) == Some(412) {
                    ObjectStoreError::AlreadyExists(key.to_string())
                } else {
                    backend_error(err)
                }
            })?;

        debug!(bucket = %self.bucket, key, size, "put object");
        Ok(self.locator(key))
    }

    async fn get_stream(&self, key: &str) -> ObjectStoreResult<ByteStream> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .is_some_and(|service_err| service_err.is_no_such_key())
                {
                    ObjectStoreError::NotFound(key.to_string())
                } else {
                    backend_error(err)
                }
            })?;

        Ok(Box::pin(ReaderStream::new(output.body.into_async_read())))
    }

    async fn sign(
        &self,
        key: &str,
        expires_in: Duration,
        content_type: &str,
    ) -> ObjectStoreResult<SignedUrl> {
        let ttl = chrono::Duration::from_std(expires_in)
            .map_err(|err| ObjectStoreError::Backend(err.to_string()))?;
        let expires_at = Utc::now() + ttl;
        let presigning = PresigningConfig::expires_in(expires_in).map_err(backend_error)?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .response_content_type(content_type)
            .response_content_disposition("inline")
            .presigned(presigning)
            .await
            .map_err(backend_error)?;

        Ok(SignedUrl {
            url: request.uri().to_string(),
            expires_at,
        })
    }

    async fn delete(&self, key: &str) -> ObjectStoreResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(backend_error)?;
        Ok(())
    }

    async fn probe(&self) -> ObjectStoreResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(backend_error)?;
        Ok(())
    }
}
