use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub watcher: WatcherConfig,
    pub s3: S3Config,
    pub swarm: SwarmConfig,
    pub manifest: ManifestConfig,
    pub signaling: SignalingConfig,
    pub viewer: ViewerConfig,
}

/// Origin HTTP server of the broadcaster.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
    /// Base used to build origin chunk URLs handed to viewers. Empty disables origin URLs.
    pub public_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 3000,
            public_base_url: "http://localhost:3000".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WatcherConfig {
    pub watch_dir: PathBuf,
    pub segment_extension: String,
    pub stability_delay_ms: u64,
    pub idle_threshold_secs: u64,
    pub idle_check_interval_ms: u64,
    pub retention_secs: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            watch_dir: PathBuf::from("./hls_output"),
            segment_extension: "ts".to_string(),
            stability_delay_ms: 500,
            idle_threshold_secs: 15,
            idle_check_interval_ms: 1000,
            retention_secs: 300,
        }
    }
}

impl WatcherConfig {
    pub fn stability_delay(&self) -> Duration {
        Duration::from_millis(self.stability_delay_ms)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    pub fn idle_check_interval(&self) -> Duration {
        Duration::from_millis(self.idle_check_interval_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct S3Config {
    pub enabled: bool,
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_access_key: String,
    pub endpoint_uri: String,
    pub cdn_host: String,
    pub key_prefix: String,
    pub upload_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Also delete the durable copy when a chunk is retired.
    pub delete_on_retire: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            enabled: false,
            bucket: String::new(),
            region: "auto".to_string(),
            access_key: String::new(),
            secret_access_key: String::new(),
            endpoint_uri: String::new(),
            cdn_host: String::new(),
            key_prefix: "live".to_string(),
            upload_timeout_secs: 20,
            max_retries: 3,
            retry_delay_ms: 1000,
            delete_on_retire: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SwarmConfig {
    pub enabled: bool,
    /// Base URL of the swarm gateway sidecar.
    pub gateway_url: String,
    pub trackers: Vec<String>,
    pub seed_timeout_secs: u64,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            gateway_url: "http://127.0.0.1:9000".to_string(),
            trackers: vec!["wss://tracker.openwebtorrent.com".to_string()],
            seed_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ManifestConfig {
    pub max_chunks: usize,
    pub target_duration: u32,
    pub version: u32,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            max_chunks: 60,
            target_duration: 6,
            version: 3,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SignalingConfig {
    pub host: String,
    pub port: u16,
    /// Where broadcasters and viewers connect to.
    pub url: String,
    pub max_manifest_chunks: usize,
    pub sweep_interval_secs: u64,
    pub stats_log_interval_secs: u64,
    pub reconnect_delay_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub send_queue_size: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            url: "ws://localhost:8080".to_string(),
            max_manifest_chunks: 20,
            sweep_interval_secs: 30,
            stats_log_interval_secs: 60,
            reconnect_delay_secs: 5,
            shutdown_timeout_secs: 5,
            send_queue_size: 256,
        }
    }
}

impl SignalingConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ViewerConfig {
    pub p2p_timeout_ms: u64,
    pub http_timeout_ms: u64,
    pub http_fallback_threshold: u32,
    pub buffer_target: usize,
    pub max_buffer_secs: f64,
    pub max_ahead_secs: f64,
    pub trim_interval_ms: u64,
    pub output_path: PathBuf,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            p2p_timeout_ms: 5000,
            http_timeout_ms: 10_000,
            http_fallback_threshold: 3,
            buffer_target: 3,
            max_buffer_secs: 30.0,
            max_ahead_secs: 60.0,
            trim_interval_ms: 1000,
            output_path: PathBuf::from("viewer_output.ts"),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_str = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&toml_str)
    }

    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(toml_str)?;
        Ok(config)
    }

    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }
}
