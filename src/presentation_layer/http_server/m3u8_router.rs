use axum::{routing::get, Router};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

use crate::business_layer::monitoring::MetricsCollector;
use crate::business_layer::streaming::{ManifestStore, SegmentDistributor};

use super::hls_handlers::{get_chunk_file, get_health, get_live_playlist, get_metrics};

/// Shared state of the broadcaster's origin server.
#[derive(Clone)]
pub struct OriginState {
    pub segment_dir: Arc<PathBuf>,
    pub segment_extension: Arc<str>,
    pub manifest: Arc<RwLock<ManifestStore>>,
    pub distributor: SegmentDistributor,
    pub metrics: Arc<MetricsCollector>,
    pub signaling_connected: Arc<AtomicBool>,
}

pub fn create_origin_router(state: OriginState) -> Router {
    Router::new()
        .route("/live/playlist.m3u8", get(get_live_playlist))
        .route("/chunks/{filename}", get(get_chunk_file))
        .route("/health", get(get_health))
        .route("/metrics", get(get_metrics))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
