use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, warn};

use super::{shutdown_signal, ServiceResult};
use crate::business_layer::monitoring::MetricsCollector;
use crate::business_layer::streaming::{ChunkDescriptor, DistributorSettings, ManifestStore, SegmentDistributor};
use crate::config::Config;
use crate::data_layer::storage::S3ClientWrapper;
use crate::data_layer::swarm::SwarmGateway;
use crate::data_layer::watcher::{ProcessedSegments, SegmentWatcher};
use crate::presentation_layer::http_server::{start_origin_server_background, OriginState};
use crate::presentation_layer::signaling::{ClientMessage, SignalingClient};

const SEGMENT_QUEUE: usize = 64;
/// Announcements held while the hub is unreachable.
const ANNOUNCE_QUEUE: usize = 256;

/// Watcher, distributor, origin server and hub announcer in one process.
pub async fn run_broadcaster(config: Config) -> ServiceResult {
    let watch_dir = config.watcher.watch_dir.clone();
    if !watch_dir.exists() {
        tokio::fs::create_dir_all(&watch_dir).await?;
        info!("Created watch directory {}", watch_dir.display());
    }

    let http = reqwest::Client::new();
    let metrics = Arc::new(MetricsCollector::new());
    let manifest = Arc::new(RwLock::new(ManifestStore::new(&config.manifest)));
    let processed = ProcessedSegments::new();
    let (announce_tx, mut announce_rx) = mpsc::channel::<ChunkDescriptor>(ANNOUNCE_QUEUE);

    let mut distributor = SegmentDistributor::new(
        DistributorSettings::from_config(&config),
        manifest.clone(),
        processed.clone(),
        announce_tx,
        metrics.clone(),
    );

    if config.s3.enabled {
        let store = S3ClientWrapper::new(&config.s3).await;
        match store.verify_connection().await {
            Ok(()) => info!("✅ Durable store reachable (bucket {})", config.s3.bucket),
            Err(e) => warn!("Durable store probe failed, uploads may fail: {}", e),
        }
        distributor = distributor.with_store(Arc::new(store));
    } else {
        info!("Durable store disabled");
    }

    if config.swarm.enabled {
        info!("Seeding through swarm gateway {}", config.swarm.gateway_url);
        distributor = distributor.with_swarm(Arc::new(SwarmGateway::new(http.clone(), &config.swarm.gateway_url)));
    } else {
        info!("Swarm seeding disabled");
    }

    let signaling = SignalingClient::new(config.signaling.url.clone(), config.signaling.reconnect_delay());
    let signaling_connected = signaling.connected_flag();
    let (frame_tx, frame_rx) = mpsc::channel::<ClientMessage>(ANNOUNCE_QUEUE);
    tokio::spawn(async move {
        while let Some(chunk) = announce_rx.recv().await {
            if frame_tx.send(ClientMessage::Chunk(chunk)).await.is_err() {
                break;
            }
        }
    });
    tokio::spawn(signaling.run(Some(frame_rx), None));

    start_origin_server_background(
        &config.server.host,
        config.server.http_port,
        OriginState {
            segment_dir: Arc::new(PathBuf::from(&watch_dir)),
            segment_extension: Arc::from(config.watcher.segment_extension.trim_start_matches('.')),
            manifest,
            distributor: distributor.clone(),
            metrics,
            signaling_connected,
        },
    )
    .await?;

    let (segment_tx, segment_rx) = mpsc::channel(SEGMENT_QUEUE);
    let watcher = SegmentWatcher::new(&config.watcher, processed, segment_tx);
    tokio::spawn(distributor.clone().run(segment_rx));

    info!("📡 Signaling: {}", config.signaling.url);
    info!("📂 Watching: {}", watch_dir.display());

    tokio::select! {
        result = watcher.start_watching() => {
            if let Err(e) = &result {
                error!("Watcher stopped: {}", e);
            }
            result?;
        }
        _ = shutdown_signal() => info!("🛑 Shutting down broadcaster..."),
    }

    distributor.shutdown().await;
    Ok(())
}
