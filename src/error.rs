use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("watch directory does not exist: {0}")]
    MissingDirectory(PathBuf),
    #[error("file watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// Stability probe outcome that is not an acceptance.
#[derive(Debug, Error)]
pub enum SegmentProbeError {
    #[error("segment vanished before it settled")]
    Vanished,
    #[error("segment is empty")]
    Empty,
    #[error("segment still growing ({before} -> {after} bytes)")]
    Unstable { before: u64, after: u64 },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read local file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("upload of {key} failed after {attempts} attempts: {message}")]
    Upload {
        key: String,
        attempts: u32,
        message: String,
    },
    #[error("storage request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("swarm gateway request failed: {0}")]
    Gateway(#[from] reqwest::Error),
    #[error("swarm gateway rejected request with status {0}")]
    Status(u16),
    #[error("swarm operation timed out")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no HTTP URL available for {0}")]
    NoUrl(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("swarm fetch failed: {0}")]
    Swarm(#[from] SwarmError),
    #[error("fetch timed out")]
    Timeout,
    #[error("fetch task aborted: {0}")]
    Aborted(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("decode buffer io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode buffer is not ready")]
    NotReady,
}
