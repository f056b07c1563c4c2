use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{shutdown_signal, ServiceResult};
use crate::business_layer::viewer::{
    ChunkDownloader, EngineSettings, ReqwestChunkSource, TimelineBuffer, ViewerDeliveryEngine, ViewerEvent,
};
use crate::config::Config;
use crate::data_layer::swarm::{PeerSwarm, SwarmGateway};
use crate::presentation_layer::signaling::{ServerMessage, SignalingClient};

const EVENT_QUEUE: usize = 256;

/// Listens on the hub and plays the stream into a file-backed buffer.
pub async fn run_viewer(config: Config, output: Option<PathBuf>) -> ServiceResult {
    let http = reqwest::Client::new();
    let swarm = config.swarm.enabled.then(|| {
        Arc::new(SwarmGateway::new(http.clone(), &config.swarm.gateway_url)) as Arc<dyn PeerSwarm>
    });
    let downloader = Arc::new(ChunkDownloader::new(
        swarm,
        Arc::new(ReqwestChunkSource::new(http)),
        &config.viewer,
    ));

    let output = output.unwrap_or_else(|| config.viewer.output_path.clone());
    let buffer = TimelineBuffer::new(config.manifest.target_duration as f64, config.viewer.max_ahead_secs)
        .with_file_sink(&output)
        .await?;
    info!("🎬 Writing stream to {}", output.display());

    let engine = ViewerDeliveryEngine::new(downloader, buffer, EngineSettings::from_config(&config.viewer));

    let (frame_tx, mut frame_rx) = mpsc::channel::<ServerMessage>(EVENT_QUEUE);
    let (event_tx, event_rx) = mpsc::channel::<ViewerEvent>(EVENT_QUEUE);

    let client = SignalingClient::new(config.signaling.url.clone(), config.signaling.reconnect_delay());
    let listening = tokio::spawn(client.run(None, Some(frame_tx)));

    let translating = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            let event = match frame {
                ServerMessage::Manifest { chunks, stats } => {
                    info!(
                        "Joined stream: {} chunks windowed, {} viewers",
                        chunks.len(),
                        stats.active_viewers
                    );
                    ViewerEvent::Manifest(chunks)
                }
                ServerMessage::Chunk(chunk) => ViewerEvent::Chunk(chunk),
                ServerMessage::Stats(stats) => {
                    info!("Hub stats: {:?}", stats);
                    continue;
                }
                ServerMessage::Pong { .. } | ServerMessage::ServerShutdown { .. } | ServerMessage::Unknown => continue,
            };
            if event_tx.send(event).await.is_err() {
                break;
            }
        }
    });

    let playing = tokio::spawn(engine.run(event_rx));

    shutdown_signal().await;
    info!("🛑 Stopping viewer...");
    listening.abort();
    translating.abort();

    match playing.await {
        Ok(stats) => info!(
            "Final stats: mode={:?}, loaded={}, skipped={}, p2p={}B, http={}B",
            stats.mode, stats.chunks_loaded, stats.chunks_skipped, stats.p2p_bytes, stats.http_bytes
        ),
        Err(e) => warn!("Delivery engine ended abnormally: {}", e),
    }
    Ok(())
}
