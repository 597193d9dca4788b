//! S3-compatible storage provider
//!
//! Wraps the AWS SDK for S3-compatible object stores (AWS, MinIO, R2, B2).

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::{string_option, ByteReader, Capabilities, FileInfo, Provider, ProviderError, Remover};
use crate::config::S3Config;
use crate::types::ProviderOptions;

/// Uploads objects into a single bucket
#[derive(Clone)]
pub struct S3Provider {
    client: Client,
    bucket: String,
}

impl S3Provider {
    /// Create a new provider from configuration
    pub async fn new(config: &S3Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "archive-backend",
        );

        let region = config
            .region
            .clone()
            .unwrap_or_else(|| "us-east-1".to_string());

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint)
            .region(Region::new(region))
            .credentials_provider(credentials)
            .force_path_style(true) // Required for MinIO and other S3-compatible services
            .build();

        let client = Client::from_conf(s3_config);

        // Uploads are retried by workers, so an unreachable bucket is not fatal here
        let bucket = config.bucket.clone();
        match client.head_bucket().bucket(&bucket).send().await {
            Ok(_) => {
                tracing::info!("Connected to S3 bucket: {}", bucket);
            }
            Err(e) => {
                tracing::warn!(
                    "Could not verify bucket {}: {}. Will attempt operations anyway.",
                    bucket,
                    e
                );
            }
        }

        Self { client, bucket }
    }

    fn handle_for(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }

    /// Object key behind a handle. Bare keys are accepted as well.
    fn key_for<'a>(&self, handle: &'a str) -> &'a str {
        handle
            .strip_prefix("s3://")
            .and_then(|rest| rest.strip_prefix(self.bucket.as_str()))
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(handle)
    }
}

/// Copy a stream into a temporary file so it can be sent with a known length
/// without holding it in memory. The file is deleted when the path drops.
async fn spool(reader: &mut ByteReader) -> std::io::Result<(TempPath, u64)> {
    let path = tempfile::Builder::new()
        .prefix("archive-s3-")
        .tempfile()?
        .into_temp_path();

    let mut file = tokio::fs::File::create(&path).await?;
    let size = tokio::io::copy(reader, &mut file).await?;
    file.flush().await?;

    Ok((path, size))
}

#[async_trait]
impl Provider for S3Provider {
    fn name(&self) -> &str {
        "s3"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            removal: true,
            geofencing: true,
        }
    }

    async fn upload(
        &self,
        mut reader: ByteReader,
        options: &ProviderOptions,
    ) -> Result<String, ProviderError> {
        let key = string_option(options, "key")?
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let content_type = string_option(options, "content_type")?;

        let (spooled, size) = spool(&mut reader)
            .await
            .map_err(|e| ProviderError::Upload(format!("Failed to read upload source: {}", e)))?;
        let body = ByteStream::from_path(&spooled)
            .await
            .map_err(|e| ProviderError::Upload(format!("Failed to stream {}: {}", key, e)))?;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body);

        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }

        request.send().await.map_err(|e| {
            ProviderError::Upload(format!("Failed to put object {}: {}", key, e))
        })?;

        tracing::debug!(bucket = %self.bucket, key = %key, bytes = size, "Uploaded S3 object");

        Ok(self.handle_for(&key))
    }

    async fn file_info(&self, handle: &str) -> Result<FileInfo, ProviderError> {
        let key = self.key_for(handle);

        let response = match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    return Ok(FileInfo::missing());
                }
                return Err(ProviderError::Unavailable(format!(
                    "Failed to head object {}: {}",
                    key, e
                )));
            }
        };

        let mut custom = serde_json::Map::new();
        custom.insert("bucket".to_string(), self.bucket.clone().into());
        custom.insert("key".to_string(), key.into());
        custom.insert(
            "size".to_string(),
            response.content_length().unwrap_or(0).into(),
        );
        if let Some(etag) = response.e_tag() {
            custom.insert("etag".to_string(), etag.into());
        }
        if let Some(content_type) = response.content_type() {
            custom.insert("content_type".to_string(), content_type.into());
        }

        Ok(FileInfo {
            exists: true,
            done_processing: true,
            custom,
        })
    }

    fn remover(&self) -> Option<&dyn Remover> {
        Some(self)
    }
}

#[async_trait]
impl Remover for S3Provider {
    async fn remove(&self, handle: &str) -> Result<(), ProviderError> {
        let key = self.key_for(handle);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("Failed to delete object {}: {}", key, e)))?;

        Ok(())
    }
}
