pub mod swarm_gateway;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::SwarmError;

pub use swarm_gateway::SwarmGateway;

/// A seeded chunk as known to the swarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmHandle {
    #[serde(rename = "magnetURI")]
    pub locator: String,
    pub info_hash: String,
}

/// Narrow contract to the peer swarm network.
#[async_trait]
pub trait PeerSwarm: Send + Sync {
    async fn seed(&self, path: &Path, trackers: &[String]) -> Result<SwarmHandle, SwarmError>;

    async fn fetch(&self, locator: &str, timeout: Duration) -> Result<Bytes, SwarmError>;

    /// Stops seeding or downloading `locator` and frees its resources.
    async fn destroy(&self, locator: &str) -> Result<(), SwarmError>;
}
