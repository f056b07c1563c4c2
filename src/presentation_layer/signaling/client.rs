use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::protocol::{ClientMessage, ServerMessage};

const PING_INTERVAL: Duration = Duration::from_secs(30);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum SessionEnd {
    Reconnect,
    Finished,
}

/// Outgoing hub connection with fixed-backoff reconnects. Broadcasters feed
/// `outbound`; listeners take frames from `inbound`.
pub struct SignalingClient {
    url: String,
    reconnect_delay: Duration,
    ping_interval: Duration,
    connected: Arc<AtomicBool>,
}

impl SignalingClient {
    pub fn new(url: impl Into<String>, reconnect_delay: Duration) -> Self {
        Self {
            url: url.into(),
            reconnect_delay,
            ping_interval: PING_INTERVAL,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn connected_flag(&self) -> Arc<AtomicBool> {
        self.connected.clone()
    }

    /// Runs until `outbound` closes or `inbound`'s receiver goes away.
    /// Frames queued while disconnected are sent after the next connect.
    pub async fn run(
        self,
        mut outbound: Option<mpsc::Receiver<ClientMessage>>,
        inbound: Option<mpsc::Sender<ServerMessage>>,
    ) {
        let mut unsent: Option<ClientMessage> = None;
        loop {
            match connect_async(self.url.as_str()).await {
                Ok((socket, _)) => {
                    info!("✅ Connected to signaling server {}", self.url);
                    self.connected.store(true, Ordering::Relaxed);
                    let end = self.session(socket, &mut outbound, &inbound, &mut unsent).await;
                    self.connected.store(false, Ordering::Relaxed);
                    if let SessionEnd::Finished = end {
                        return;
                    }
                    warn!("Disconnected from signaling server");
                }
                Err(e) => warn!("Signaling connection to {} failed: {}", self.url, e),
            }
            info!("Reconnecting in {}s...", self.reconnect_delay.as_secs());
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    async fn session(
        &self,
        socket: Socket,
        outbound: &mut Option<mpsc::Receiver<ClientMessage>>,
        inbound: &Option<mpsc::Sender<ServerMessage>>,
        unsent: &mut Option<ClientMessage>,
    ) -> SessionEnd {
        let (mut sink, mut source) = socket.split();
        let mut ping = tokio::time::interval_at(tokio::time::Instant::now() + self.ping_interval, self.ping_interval);

        if let Some(message) = unsent.take() {
            if let Err(message) = send(&mut sink, message).await {
                *unsent = Some(message);
                return SessionEnd::Reconnect;
            }
        }

        loop {
            tokio::select! {
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerMessage>(text.as_str()) {
                        Ok(ServerMessage::ServerShutdown { message }) => {
                            warn!("Signaling server shutting down: {}", message);
                            return SessionEnd::Reconnect;
                        }
                        Ok(message) => {
                            if let Some(tx) = inbound {
                                if tx.send(message).await.is_err() {
                                    let _ = sink.send(Message::Close(None)).await;
                                    return SessionEnd::Finished;
                                }
                            }
                        }
                        Err(e) => warn!("Ignoring malformed frame from hub: {}", e),
                    },
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Reconnect,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("Signaling socket error: {}", e);
                        return SessionEnd::Reconnect;
                    }
                },
                next = next_outbound(outbound) => match next {
                    Some(message) => {
                        if let Err(message) = send(&mut sink, message).await {
                            *unsent = Some(message);
                            return SessionEnd::Reconnect;
                        }
                    }
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        return SessionEnd::Finished;
                    }
                },
                _ = ping.tick() => {
                    if send(&mut sink, ClientMessage::Ping {}).await.is_err() {
                        return SessionEnd::Reconnect;
                    }
                }
            }
        }
    }
}

async fn next_outbound(outbound: &mut Option<mpsc::Receiver<ClientMessage>>) -> Option<ClientMessage> {
    match outbound {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Sends one frame; hands the message back if the socket refused it.
async fn send<S>(sink: &mut S, message: ClientMessage) -> Result<(), ClientMessage>
where
    S: SinkExt<Message> + Unpin,
{
    let text = match serde_json::to_string(&message) {
        Ok(text) => text,
        Err(e) => {
            warn!("Dropping unencodable frame: {}", e);
            return Ok(());
        }
    };
    sink.send(Message::Text(text.into())).await.map_err(|_| message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::business_layer::streaming::ChunkDescriptor;
    use crate::config::SignalingConfig;
    use crate::presentation_layer::signaling::ws_server::SignalingServer;

    fn chunk(seq: u64) -> ChunkDescriptor {
        let mut chunk = ChunkDescriptor::new(seq, format!("stream{:04}.ts", seq), "s1");
        chunk.durable_url = Some(format!("https://cdn.test/{}", seq));
        chunk
    }

    #[tokio::test]
    async fn broadcaster_and_viewer_through_hub() {
        let server = SignalingServer::bind(&SignalingConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..SignalingConfig::default()
        })
        .await
        .unwrap();
        let url = format!("ws://{}/", server.local_addr().unwrap());
        let hub = server.hub();
        let serving = tokio::spawn(server.serve(std::future::pending()));

        let (announce_tx, announce_rx) = mpsc::channel(8);
        let broadcaster = SignalingClient::new(url.clone(), Duration::from_millis(50));
        let broadcasting = tokio::spawn(broadcaster.run(Some(announce_rx), None));
        announce_tx.send(ClientMessage::Chunk(chunk(1))).await.unwrap();
        announce_tx.send(ClientMessage::Chunk(chunk(2))).await.unwrap();

        // Wait until the hub has windowed both chunks.
        for _ in 0..100 {
            if hub.lock().await.window_len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(hub.lock().await.stats().active_broadcasters, 1);

        let (inbound_tx, mut inbound_rx) = mpsc::channel(8);
        let viewer = SignalingClient::new(url, Duration::from_millis(50));
        let viewing = tokio::spawn(viewer.run(None, Some(inbound_tx)));

        match tokio::time::timeout(Duration::from_secs(5), inbound_rx.recv()).await.unwrap() {
            Some(ServerMessage::Manifest { chunks, .. }) => assert_eq!(chunks.len(), 2),
            other => panic!("expected manifest, got {:?}", other),
        }

        announce_tx.send(ClientMessage::Chunk(chunk(3))).await.unwrap();
        match tokio::time::timeout(Duration::from_secs(5), inbound_rx.recv()).await.unwrap() {
            Some(ServerMessage::Chunk(c)) => assert_eq!(c.seq, 3),
            other => panic!("expected chunk, got {:?}", other),
        }

        drop(announce_tx);
        tokio::time::timeout(Duration::from_secs(5), broadcasting).await.unwrap().unwrap();
        viewing.abort();
        serving.abort();
    }
}
