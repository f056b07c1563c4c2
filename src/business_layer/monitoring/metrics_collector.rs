use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::metrics_types::{ChunkReport, DistributionMetrics};

const MAX_REPORTS: usize = 120;

pub struct MetricsCollector {
    totals: Arc<RwLock<DistributionMetrics>>,
    recent: Arc<RwLock<VecDeque<ChunkReport>>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            totals: Arc::new(RwLock::new(DistributionMetrics {
                start_time: Utc::now(),
                uptime_seconds: 0,
                total_segments: 0,
                total_bytes: 0,
                upload_failures: 0,
                seed_failures: 0,
                origin_only_chunks: 0,
                announce_failures: 0,
                sessions: 1,
                retired_chunks: 0,
                last_segment_time: None,
            })),
            recent: Arc::new(RwLock::new(VecDeque::with_capacity(MAX_REPORTS))),
        }
    }

    pub async fn record_chunk(&self, report: ChunkReport) {
        {
            let mut totals = self.totals.write().await;
            totals.total_segments += 1;
            totals.total_bytes += report.size;
            totals.last_segment_time = Some(report.published_at);
            if !report.uploaded {
                totals.upload_failures += 1;
            }
            if !report.seeded {
                totals.seed_failures += 1;
            }
            if report.origin_only {
                totals.origin_only_chunks += 1;
            }
            if !report.announced {
                totals.announce_failures += 1;
            }
        }

        let mut recent = self.recent.write().await;
        recent.push_back(report);
        while recent.len() > MAX_REPORTS {
            recent.pop_front();
        }
    }

    pub async fn record_session_start(&self) {
        self.totals.write().await.sessions += 1;
    }

    pub async fn record_retired(&self) {
        self.totals.write().await.retired_chunks += 1;
    }

    pub async fn get_metrics(&self) -> DistributionMetrics {
        let mut totals = self.totals.read().await.clone();
        totals.uptime_seconds = (Utc::now() - totals.start_time).num_seconds().max(0) as u64;
        totals
    }

    pub async fn recent_chunks(&self) -> Vec<ChunkReport> {
        self.recent.read().await.iter().cloned().collect()
    }

    pub async fn export_metrics_json(&self) -> serde_json::Value {
        serde_json::json!({
            "distribution": self.get_metrics().await,
            "chunks": self.recent_chunks().await,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
