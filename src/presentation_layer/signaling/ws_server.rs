use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::hub::{Outbound, SignalingHub};
use super::protocol::ClientMessage;
use crate::config::SignalingConfig;

#[derive(Clone)]
pub struct HubState {
    pub hub: Arc<Mutex<SignalingHub>>,
    pub queue_size: usize,
}

pub fn create_signaling_router(state: HubState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/stats", get(get_stats))
        .route("/health", get(get_health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<HubState>,
) -> impl IntoResponse {
    ws.max_message_size(256 * 1024)
        .on_upgrade(move |socket| handle_socket(socket, remote, state))
}

async fn handle_socket(socket: WebSocket, remote: SocketAddr, state: HubState) {
    let id = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Outbound>(state.queue_size.max(1));

    state.hub.lock().await.register(id, tx, Some(remote));

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let result = match frame {
                Outbound::Text(text) => sink.send(Message::Text(text.into())).await,
                Outbound::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            };
            if let Err(e) = result {
                debug!("Writer for {} stopped: {}", id, e);
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(message) => {
                    state.hub.lock().await.handle_message(id, message);
                }
                Err(e) => warn!("Ignoring malformed frame from {}: {}", remote, e),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Socket error from {}: {}", remote, e);
                break;
            }
        }
    }

    state.hub.lock().await.unregister(&id);
    writer.abort();
}

async fn get_stats(State(state): State<HubState>) -> impl IntoResponse {
    Json(state.hub.lock().await.stats())
}

async fn get_health(State(state): State<HubState>) -> impl IntoResponse {
    let hub = state.hub.lock().await;
    let stats = hub.stats();
    Json(json!({
        "status": "ok",
        "connections": hub.connection_count(),
        "viewers": stats.active_viewers,
        "broadcasters": stats.active_broadcasters,
        "manifestChunks": stats.manifest_chunks,
        "uptime": stats.server_uptime,
    }))
}

/// Bound hub server; `serve` runs it until `shutdown` resolves.
pub struct SignalingServer {
    listener: TcpListener,
    state: HubState,
    sweep_interval: Duration,
    stats_interval: Duration,
    shutdown_timeout: Duration,
}

impl SignalingServer {
    pub async fn bind(config: &SignalingConfig) -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        Ok(Self {
            listener,
            state: HubState {
                hub: Arc::new(Mutex::new(SignalingHub::new(config.max_manifest_chunks))),
                queue_size: config.send_queue_size,
            },
            sweep_interval: Duration::from_secs(config.sweep_interval_secs.max(1)),
            stats_interval: Duration::from_secs(config.stats_log_interval_secs.max(1)),
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    pub fn hub(&self) -> Arc<Mutex<SignalingHub>> {
        self.state.hub.clone()
    }

    pub async fn serve<F>(self, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let hub = self.state.hub.clone();
        let maintenance = tokio::spawn(maintain(hub.clone(), self.sweep_interval, self.stats_interval));

        if let Ok(addr) = self.listener.local_addr() {
            info!("📡 Signaling server listening on ws://{}", addr);
        }

        let shutdown_timeout = self.shutdown_timeout;
        let app = create_signaling_router(self.state);
        let result = axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("🛑 Shutting down signaling server...");
            let notified = hub.lock().await.shutdown_notice();
            info!("Shutdown notice queued for {} connection(s)", notified);
            tokio::spawn(async move {
                tokio::time::sleep(shutdown_timeout).await;
                error!("Forced shutdown after {}s", shutdown_timeout.as_secs());
                std::process::exit(1);
            });
        })
        .await;

        maintenance.abort();
        result
    }
}

async fn maintain(hub: Arc<Mutex<SignalingHub>>, sweep_interval: Duration, stats_interval: Duration) {
    let mut sweep = tokio::time::interval(sweep_interval);
    let mut stats = tokio::time::interval(stats_interval);
    loop {
        tokio::select! {
            _ = sweep.tick() => {
                hub.lock().await.sweep();
            }
            _ = stats.tick() => {
                let hub = hub.lock().await;
                if hub.connection_count() > 0 {
                    let s = hub.stats();
                    info!(
                        "📊 Stats: {} viewers, {} broadcasters, {} chunks in manifest, {} total",
                        s.active_viewers, s.active_broadcasters, s.manifest_chunks, s.total_chunks
                    );
                }
            }
        }
    }
}
