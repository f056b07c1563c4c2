use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use aws_types::region::Region;
use std::path::Path;
use tracing::{debug, info, warn};

use super::durable_store::DurableStore;
use super::s3_types::{S3UploadConfig, UploadResult, UploadTask};
use crate::config::S3Config;
use crate::error::StorageError;
use crate::utils::content_type::content_type_for;

const PROBE_KEY: &str = "connection-test.txt";

/// S3-compatible client (AWS S3, Cloudflare R2) used as the durable segment store.
pub struct S3ClientWrapper {
    client: S3Client,
    bucket: String,
    region: String,
    cdn_host: String,
    config: S3UploadConfig,
}

impl S3ClientWrapper {
    pub async fn new(s3_config: &S3Config) -> Self {
        let region = Region::new(s3_config.region.clone());

        let credentials = Credentials::new(
            &s3_config.access_key,
            &s3_config.secret_access_key,
            None,
            None,
            "swarm-live-relay",
        );

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(region)
            .credentials_provider(credentials);
        if !s3_config.endpoint_uri.is_empty() {
            loader = loader.endpoint_url(&s3_config.endpoint_uri);
        }
        let aws_config = loader.load().await;

        // R2 and most S3-compatible stores only speak path-style addressing.
        let s3_conf = aws_sdk_s3::config::Builder::from(&aws_config)
            .force_path_style(!s3_config.endpoint_uri.is_empty())
            .build();

        Self {
            client: S3Client::from_conf(s3_conf),
            bucket: s3_config.bucket.clone(),
            region: s3_config.region.clone(),
            cdn_host: s3_config.cdn_host.clone(),
            config: S3UploadConfig {
                max_retries: s3_config.max_retries.max(1),
                retry_delay_ms: s3_config.retry_delay_ms,
                ..S3UploadConfig::default()
            },
        }
    }

    pub fn public_url(&self, key: &str) -> String {
        if self.cdn_host.is_empty() {
            format!("https://{}.s3.{}.amazonaws.com/{}", self.bucket, self.region, key)
        } else {
            format!("https://{}/{}", self.cdn_host.trim_end_matches('/'), key)
        }
    }

    /// Startup probe. A missing probe object still proves the bucket is reachable.
    pub async fn verify_connection(&self) -> Result<(), StorageError> {
        self.exists(PROBE_KEY).await.map(|_| ())
    }

    pub async fn upload_file(&self, task: &UploadTask) -> Result<UploadResult, StorageError> {
        let file_content = tokio::fs::read(&task.file_path)
            .await
            .map_err(|source| StorageError::ReadFile {
                path: task.file_path.clone(),
                source,
            })?;
        let size = file_content.len() as u64;

        let mut retry_count = 0;
        loop {
            let body = ByteStream::from(file_content.clone());

            match self
                .client
                .put_object()
                .bucket(&self.bucket)
                .key(&task.s3_key)
                .body(body)
                .content_type(task.content_type)
                .cache_control(self.config.cache_control)
                .metadata("upload-timestamp", chrono::Utc::now().to_rfc3339())
                .send()
                .await
            {
                Ok(_) => {
                    self.verify_upload(&task.s3_key, size).await;
                    return Ok(UploadResult {
                        public_url: self.public_url(&task.s3_key),
                        size,
                        attempts: retry_count + 1,
                    });
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count >= self.config.max_retries {
                        return Err(StorageError::Upload {
                            key: task.s3_key.clone(),
                            attempts: retry_count,
                            message: DisplayErrorContext(&e).to_string(),
                        });
                    }
                    debug!("Upload attempt {} for {} failed, retrying", retry_count, task.s3_key);
                    tokio::time::sleep(tokio::time::Duration::from_millis(
                        self.config.retry_delay_ms * retry_count as u64,
                    ))
                    .await;
                }
            }
        }
    }

    /// Compares the stored object length with the local size. Mismatches are only logged.
    async fn verify_upload(&self, key: &str, local_size: u64) {
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(head) => {
                if let Some(remote) = head.content_length() {
                    if remote as u64 != local_size {
                        warn!("Size mismatch for {}: local={}, remote={}", key, local_size, remote);
                    }
                }
            }
            Err(e) => warn!("Could not verify upload of {}: {}", key, DisplayErrorContext(&e)),
        }
    }
}

#[async_trait]
impl DurableStore for S3ClientWrapper {
    async fn put_segment(&self, path: &Path, key: &str) -> Result<String, StorageError> {
        let task = UploadTask {
            file_path: path.to_path_buf(),
            s3_key: key.to_string(),
            content_type: content_type_for(path),
        };
        let result = self.upload_file(&task).await?;
        info!(
            "Uploaded {} ({} bytes, {} attempt(s))",
            task.s3_key, result.size, result.attempts
        );
        Ok(result.public_url)
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false) {
                    Ok(false)
                } else {
                    Err(StorageError::Request(DisplayErrorContext(&e).to_string()))
                }
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Request(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }
}
