use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::business_layer::streaming::ChunkDescriptor;
use crate::config::ViewerConfig;
use crate::data_layer::swarm::PeerSwarm;
use crate::error::FetchError;
use crate::utils::log_error::LogError;

#[async_trait]
pub trait HttpChunkSource: Send + Sync {
    async fn get(&self, url: &str) -> Result<Bytes, FetchError>;
}

pub struct ReqwestChunkSource {
    client: Client,
}

impl ReqwestChunkSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpChunkSource for ReqwestChunkSource {
    async fn get(&self, url: &str) -> Result<Bytes, FetchError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }
        Ok(response.bytes().await?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    P2p,
    /// Terminal for the session.
    Http,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferStats {
    pub p2p_attempts: u64,
    pub p2p_failures: u64,
    pub p2p_bytes: u64,
    pub http_bytes: u64,
}

#[derive(Debug)]
struct DownloadState {
    mode: DeliveryMode,
    consecutive_failures: u32,
    epoch: u64,
    stats: TransferStats,
}

/// Downloads one chunk at a time: P2P first while the mode allows it, then a
/// single HTTP attempt. Shared by every in-flight download of an engine.
pub struct ChunkDownloader {
    swarm: Option<Arc<dyn PeerSwarm>>,
    http: Arc<dyn HttpChunkSource>,
    p2p_timeout: Duration,
    http_timeout: Duration,
    threshold: u32,
    state: Mutex<DownloadState>,
}

impl ChunkDownloader {
    pub fn new(swarm: Option<Arc<dyn PeerSwarm>>, http: Arc<dyn HttpChunkSource>, config: &ViewerConfig) -> Self {
        Self {
            swarm,
            http,
            p2p_timeout: Duration::from_millis(config.p2p_timeout_ms),
            http_timeout: Duration::from_millis(config.http_timeout_ms),
            threshold: config.http_fallback_threshold.max(1),
            state: Mutex::new(DownloadState {
                mode: DeliveryMode::P2p,
                consecutive_failures: 0,
                epoch: 0,
                stats: TransferStats::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DownloadState> {
        // Counters stay meaningful even if a holder panicked.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn mode(&self) -> DeliveryMode {
        self.lock().mode
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn stats(&self) -> TransferStats {
        self.lock().stats.clone()
    }

    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Back to P2P with a clean failure count. Returns the new epoch; results
    /// of downloads started under older epochs no longer touch the counters.
    pub fn reset_session(&self) -> u64 {
        let mut state = self.lock();
        state.mode = DeliveryMode::P2p;
        state.consecutive_failures = 0;
        state.epoch += 1;
        state.epoch
    }

    pub async fn download(&self, chunk: &ChunkDescriptor, epoch: u64) -> Result<Bytes, FetchError> {
        if let (Some(swarm), Some(locator)) = (&self.swarm, chunk.swarm_locator.as_deref()) {
            if self.mode() == DeliveryMode::P2p {
                self.lock().stats.p2p_attempts += 1;
                match self.fetch_p2p(swarm, locator).await {
                    Ok(bytes) => {
                        debug!("Chunk {} loaded via P2P ({} bytes)", chunk.filename, bytes.len());
                        self.record_p2p(epoch, Some(bytes.len()));
                        return Ok(bytes);
                    }
                    Err(e) => {
                        warn!("P2P failed for {}: {}, trying HTTP", chunk.filename, e);
                        self.record_p2p(epoch, None);
                    }
                }
            }
        }

        let url = chunk
            .http_url()
            .ok_or_else(|| FetchError::NoUrl(chunk.filename.clone()))?;
        let bytes = timeout(self.http_timeout, self.http.get(url))
            .await
            .map_err(|_| FetchError::Timeout)??;
        debug!("Chunk {} loaded via HTTP ({} bytes)", chunk.filename, bytes.len());
        self.lock().stats.http_bytes += bytes.len() as u64;
        Ok(bytes)
    }

    /// The fetch runs on its own task so a timeout abandons it rather than
    /// cancelling it; the swarm handle is destroyed either way.
    async fn fetch_p2p(&self, swarm: &Arc<dyn PeerSwarm>, locator: &str) -> Result<Bytes, FetchError> {
        let task_swarm = swarm.clone();
        let task_locator = locator.to_string();
        let limit = self.p2p_timeout;
        let task = tokio::spawn(async move { task_swarm.fetch(&task_locator, limit).await });

        let result = match timeout(limit, task).await {
            Ok(joined) => joined
                .map_err(FetchError::from)
                .and_then(|fetched| fetched.map_err(FetchError::from)),
            Err(_) => Err(FetchError::Timeout),
        };

        swarm
            .destroy(locator)
            .await
            .log_error("Failed to release swarm download");
        result
    }

    fn record_p2p(&self, epoch: u64, loaded: Option<usize>) {
        let mut state = self.lock();
        match loaded {
            Some(len) => {
                state.stats.p2p_bytes += len as u64;
                if state.epoch == epoch {
                    state.consecutive_failures = 0;
                }
            }
            None => {
                state.stats.p2p_failures += 1;
                if state.epoch != epoch || state.mode == DeliveryMode::Http {
                    return;
                }
                state.consecutive_failures += 1;
                if state.consecutive_failures >= self.threshold {
                    state.mode = DeliveryMode::Http;
                    info!(
                        "Switching to HTTP-only mode after {} consecutive P2P failures",
                        state.consecutive_failures
                    );
                }
            }
        }
    }
}
