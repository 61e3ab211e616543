//! S3-backed object store.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, instrument};

use super::{ObjectPage, ObjectStore};
use crate::error::{Result, SmritiError};

/// [`ObjectStore`] over an S3 client.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Build a client from shared AWS configuration.
    ///
    /// Path-style addressing is forced when a custom endpoint is configured
    /// (LocalStack, MinIO).
    pub fn new(sdk_config: &SdkConfig) -> Self {
        let builder = aws_sdk_s3::config::Builder::from(sdk_config);
        let s3_config = if sdk_config.endpoint_url().is_some() {
            builder.force_path_style(true).build()
        } else {
            builder.build()
        };
        Self {
            client: Client::from_conf(s3_config),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(level = "debug", skip(self))]
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ObjectPage> {
        let resp = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_continuation_token(continuation)
            .send()
            .await
            .map_err(|e| {
                SmritiError::Storage(format!("S3 list objects failed: {}", DisplayErrorContext(&e)))
            })?;

        let keys: Vec<String> = resp
            .contents()
            .iter()
            .filter_map(|obj| obj.key())
            .filter(|key| !key.is_empty() && !key.ends_with('/'))
            .map(str::to_string)
            .collect();

        let next = if resp.is_truncated() == Some(true) {
            resp.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        debug!(count = keys.len(), more = next.is_some(), "Listed page");
        Ok(ObjectPage { keys, next })
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                SmritiError::Storage(format!(
                    "S3 get object {key} failed: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        let body = resp
            .body
            .collect()
            .await
            .map_err(|e| SmritiError::Storage(format!("S3 body read for {key} failed: {e}")))?;
        Ok(body.into_bytes().to_vec())
    }

    #[instrument(level = "debug", skip(self))]
    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => Err(SmritiError::Storage(format!(
                "S3 head object {key} failed: {}",
                DisplayErrorContext(&e)
            ))),
        }
    }

    #[instrument(level = "debug", skip(self, bytes), fields(bytes = bytes.len()))]
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .set_content_type(content_type.map(str::to_string))
            .send()
            .await
            .map_err(|e| {
                SmritiError::Storage(format!(
                    "S3 put object {key} failed: {}",
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }

    async fn presigned_get_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| SmritiError::Storage(format!("Invalid presign expiry: {e}")))?;

        let request = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| {
                SmritiError::Storage(format!(
                    "S3 presign {key} failed: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        Ok(request.uri().to_string())
    }
}
