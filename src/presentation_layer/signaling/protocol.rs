use serde::{Deserialize, Serialize};

use crate::business_layer::streaming::ChunkDescriptor;

/// Frames a connection may send to the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Chunk(ChunkDescriptor),
    Ping {},
    Stats {},
    #[serde(other)]
    Unknown,
}

/// Frames the hub sends out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Manifest {
        chunks: Vec<ChunkDescriptor>,
        stats: ManifestSummary,
    },
    Chunk(ChunkDescriptor),
    Pong {
        timestamp: i64,
    },
    Stats(HubStats),
    ServerShutdown {
        message: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSummary {
    pub total_chunks: u64,
    pub active_viewers: usize,
    /// Milliseconds.
    pub server_uptime: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub total_chunks: u64,
    pub manifest_chunks: usize,
    pub active_viewers: usize,
    pub active_broadcasters: usize,
    /// Milliseconds.
    pub server_uptime: u64,
    #[serde(default)]
    pub failed_sends: u64,
}
