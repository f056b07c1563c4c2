use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

use super::{PeerSwarm, SwarmHandle};
use crate::error::SwarmError;

#[derive(Serialize)]
struct SeedRequest<'a> {
    path: String,
    name: &'a str,
    announce: &'a [String],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FetchRequest<'a> {
    magnet: &'a str,
    timeout_ms: u64,
}

#[derive(Serialize)]
struct DestroyRequest<'a> {
    magnet: &'a str,
}

/// HTTP client for the swarm sidecar that owns the actual torrent sessions.
pub struct SwarmGateway {
    client: Client,
    base_url: String,
}

impl SwarmGateway {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn check(response: &reqwest::Response) -> Result<(), SwarmError> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(SwarmError::Status(response.status().as_u16()))
        }
    }
}

#[async_trait]
impl PeerSwarm for SwarmGateway {
    async fn seed(&self, path: &Path, trackers: &[String]) -> Result<SwarmHandle, SwarmError> {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let response = self
            .client
            .post(self.endpoint("seed"))
            .json(&SeedRequest {
                path: path.to_string_lossy().to_string(),
                name,
                announce: trackers,
            })
            .send()
            .await?;
        Self::check(&response)?;
        Ok(response.json::<SwarmHandle>().await?)
    }

    async fn fetch(&self, locator: &str, timeout: Duration) -> Result<Bytes, SwarmError> {
        let response = self
            .client
            .post(self.endpoint("fetch"))
            .timeout(timeout)
            .json(&FetchRequest {
                magnet: locator,
                timeout_ms: timeout.as_millis() as u64,
            })
            .send()
            .await
            .map_err(|e| if e.is_timeout() { SwarmError::Timeout } else { SwarmError::Gateway(e) })?;
        Self::check(&response)?;
        Ok(response.bytes().await?)
    }

    async fn destroy(&self, locator: &str) -> Result<(), SwarmError> {
        let response = self
            .client
            .post(self.endpoint("destroy"))
            .json(&DestroyRequest { magnet: locator })
            .send()
            .await?;
        Self::check(&response)
    }
}
