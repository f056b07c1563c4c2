use chrono::{DateTime, Utc};
use serde::Serialize;

/// Per-chunk publication outcome.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChunkReport {
    pub seq: u64,
    pub filename: String,
    pub session_id: String,
    pub size: u64,
    pub uploaded: bool,
    pub seeded: bool,
    /// Neither a durable URL nor a swarm locator.
    pub origin_only: bool,
    pub announced: bool,
    pub published_at: DateTime<Utc>,
}

/// Broadcaster-wide counters.
#[derive(Debug, Clone, Serialize)]
pub struct DistributionMetrics {
    pub start_time: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub total_segments: u64,
    pub total_bytes: u64,
    pub upload_failures: u64,
    pub seed_failures: u64,
    pub origin_only_chunks: u64,
    pub announce_failures: u64,
    pub sessions: u64,
    pub retired_chunks: u64,
    pub last_segment_time: Option<DateTime<Utc>>,
}
