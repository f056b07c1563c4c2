/// One segment upload: local file to object key.
#[derive(Debug, Clone)]
pub struct UploadTask {
    pub file_path: std::path::PathBuf,
    pub s3_key: String,
    pub content_type: &'static str,
}

/// S3 upload result.
#[derive(Debug, Clone)]
pub struct UploadResult {
    pub public_url: String,
    pub size: u64,
    pub attempts: u32,
}

/// Retry policy for uploads.
#[derive(Debug, Clone)]
pub struct S3UploadConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub cache_control: &'static str,
}

impl Default for S3UploadConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
            cache_control: "public, max-age=300",
        }
    }
}
