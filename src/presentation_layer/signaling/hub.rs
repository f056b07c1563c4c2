use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::protocol::{ClientMessage, HubStats, ManifestSummary, ServerMessage};
use crate::business_layer::streaming::ChunkDescriptor;
use crate::utils::log_error::LogError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    Viewer,
    Broadcaster,
}

impl ConnectionRole {
    /// The only transition: anyone announcing a chunk is a broadcaster from then on.
    pub fn promoted(self) -> Self {
        ConnectionRole::Broadcaster
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Open,
    Closing,
}

/// What a connection's writer task puts on the socket.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    Close,
}

#[derive(Debug)]
struct Connection {
    role: ConnectionRole,
    liveness: Liveness,
    sender: mpsc::Sender<Outbound>,
    remote: Option<SocketAddr>,
}

impl Connection {
    fn is_live(&self) -> bool {
        self.liveness == Liveness::Open && !self.sender.is_closed()
    }

    /// Non-blocking enqueue. A full or closed queue is a failed send.
    fn offer(&mut self, frame: Outbound) -> bool {
        match self.sender.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Closed(_)) => {
                self.liveness = Liveness::Closing;
                false
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanOutReport {
    pub delivered: usize,
    pub failed: usize,
    pub duplicate: bool,
}

/// Connection sets and the hub's own chunk window. Owned by one mutex in the
/// server; every method is synchronous.
pub struct SignalingHub {
    viewers: HashMap<Uuid, Connection>,
    broadcasters: HashMap<Uuid, Connection>,
    window: VecDeque<ChunkDescriptor>,
    max_window: usize,
    total_chunks: u64,
    failed_sends: u64,
    started_at: Instant,
}

fn encode(message: &ServerMessage) -> Option<String> {
    serde_json::to_string(message).log_error("Failed to encode signaling frame")
}

impl SignalingHub {
    pub fn new(max_window: usize) -> Self {
        Self {
            viewers: HashMap::new(),
            broadcasters: HashMap::new(),
            window: VecDeque::with_capacity(max_window),
            max_window: max_window.max(1),
            total_chunks: 0,
            failed_sends: 0,
            started_at: Instant::now(),
        }
    }

    fn uptime_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    fn connection_mut(&mut self, id: &Uuid) -> Option<&mut Connection> {
        match self.viewers.get_mut(id) {
            Some(conn) => Some(conn),
            None => self.broadcasters.get_mut(id),
        }
    }

    pub fn manifest_message(&self) -> ServerMessage {
        ServerMessage::Manifest {
            chunks: self.window.iter().cloned().collect(),
            stats: ManifestSummary {
                total_chunks: self.total_chunks,
                active_viewers: self.viewers.len(),
                server_uptime: self.uptime_ms(),
            },
        }
    }

    /// Adds a connection as a viewer. The catch-up manifest is queued before
    /// the connection joins the fan-out set, so it always precedes live chunks.
    pub fn register(&mut self, id: Uuid, sender: mpsc::Sender<Outbound>, remote: Option<SocketAddr>) -> bool {
        let mut conn = Connection {
            role: ConnectionRole::Viewer,
            liveness: Liveness::Open,
            sender,
            remote,
        };

        let mut sent_manifest = false;
        if !self.window.is_empty() {
            if let Some(frame) = encode(&self.manifest_message()) {
                sent_manifest = conn.offer(Outbound::Text(frame));
                if sent_manifest {
                    debug!("Sent manifest with {} chunks to {}", self.window.len(), id);
                } else {
                    self.failed_sends += 1;
                }
            }
        }

        self.viewers.insert(id, conn);
        info!(
            "🔌 New connection {} from {} (viewers: {})",
            id,
            remote.map(|r| r.to_string()).unwrap_or_else(|| "unknown".into()),
            self.viewers.len()
        );
        sent_manifest
    }

    /// Handles one decoded frame. Only chunk announcements produce a report.
    pub fn handle_message(&mut self, from: Uuid, message: ClientMessage) -> Option<FanOutReport> {
        match message {
            ClientMessage::Chunk(chunk) => Some(self.ingest_chunk(from, chunk)),
            ClientMessage::Ping {} => {
                self.reply(from, &ServerMessage::Pong {
                    timestamp: Utc::now().timestamp_millis(),
                });
                None
            }
            ClientMessage::Stats {} => {
                self.reply(from, &ServerMessage::Stats(self.stats()));
                None
            }
            ClientMessage::Unknown => {
                debug!("Ignoring unknown frame type from {}", from);
                None
            }
        }
    }

    fn reply(&mut self, to: Uuid, message: &ServerMessage) {
        let Some(frame) = encode(message) else { return };
        let delivered = self
            .connection_mut(&to)
            .map(|conn| conn.offer(Outbound::Text(frame)))
            .unwrap_or(false);
        if !delivered {
            self.failed_sends += 1;
        }
    }

    fn promote(&mut self, id: Uuid) {
        if let Some(mut conn) = self.viewers.remove(&id) {
            conn.role = conn.role.promoted();
            info!("📡 Connection {} promoted to broadcaster", id);
            self.broadcasters.insert(id, conn);
        }
    }

    /// Promotes the sender, windows the chunk and fans it out once to every viewer.
    pub fn ingest_chunk(&mut self, from: Uuid, chunk: ChunkDescriptor) -> FanOutReport {
        self.promote(from);

        if self.window.iter().any(|c| c.same_chunk(&chunk)) {
            debug!("Duplicate announcement for {} ignored", chunk.filename);
            return FanOutReport {
                duplicate: true,
                ..FanOutReport::default()
            };
        }

        self.window.push_back(chunk.clone());
        while self.window.len() > self.max_window {
            self.window.pop_front();
        }
        self.total_chunks += 1;

        let mut report = FanOutReport::default();
        let filename = chunk.filename.clone();
        let Some(frame) = encode(&ServerMessage::Chunk(chunk)) else {
            return report;
        };

        for (id, viewer) in self.viewers.iter_mut() {
            if viewer.liveness != Liveness::Open {
                continue;
            }
            if viewer.offer(Outbound::Text(frame.clone())) {
                report.delivered += 1;
            } else {
                warn!("❌ Failed to queue {} for viewer {}", filename, id);
                report.failed += 1;
            }
        }
        self.failed_sends += report.failed as u64;

        info!(
            "📦 Chunk {} sent to {}/{} viewers",
            filename,
            report.delivered,
            report.delivered + report.failed
        );
        report
    }

    pub fn mark_closing(&mut self, id: &Uuid) {
        if let Some(conn) = self.connection_mut(id) {
            conn.liveness = Liveness::Closing;
        }
    }

    pub fn unregister(&mut self, id: &Uuid) -> Option<ConnectionRole> {
        let conn = self.viewers.remove(id).or_else(|| self.broadcasters.remove(id))?;
        info!(
            "Connection {} ({:?}) closed (viewers: {}, broadcasters: {})",
            id,
            conn.role,
            self.viewers.len(),
            self.broadcasters.len()
        );
        Some(conn.role)
    }

    /// Drops connections that are closing or whose writer has gone away.
    pub fn sweep(&mut self) -> usize {
        let before = self.viewers.len() + self.broadcasters.len();
        self.viewers.retain(|_, conn| conn.is_live());
        self.broadcasters.retain(|_, conn| conn.is_live());
        let removed = before - self.viewers.len() - self.broadcasters.len();
        if removed > 0 {
            info!("🧹 Swept {} dead connection(s)", removed);
        }
        removed
    }

    /// Queues the shutdown notice and a close for every connection.
    pub fn shutdown_notice(&mut self) -> usize {
        let Some(frame) = encode(&ServerMessage::ServerShutdown {
            message: "Server is shutting down".into(),
        }) else {
            return 0;
        };

        let mut notified = 0;
        for conn in self.viewers.values_mut().chain(self.broadcasters.values_mut()) {
            if conn.offer(Outbound::Text(frame.clone())) {
                notified += 1;
            }
            conn.offer(Outbound::Close);
            conn.liveness = Liveness::Closing;
        }
        notified
    }

    pub fn role_of(&self, id: &Uuid) -> Option<ConnectionRole> {
        self.viewers
            .get(id)
            .or_else(|| self.broadcasters.get(id))
            .map(|conn| conn.role)
    }

    pub fn connection_count(&self) -> usize {
        self.viewers.len() + self.broadcasters.len()
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            total_chunks: self.total_chunks,
            manifest_chunks: self.window.len(),
            active_viewers: self.viewers.len(),
            active_broadcasters: self.broadcasters.len(),
            server_uptime: self.uptime_ms(),
            failed_sends: self.failed_sends,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(seq: u64) -> ChunkDescriptor {
        let mut chunk = ChunkDescriptor::new(seq, format!("stream{:04}.ts", seq), "s1");
        chunk.durable_url = Some(format!("https://cdn.test/{}", seq));
        chunk
    }

    fn connect(hub: &mut SignalingHub) -> (Uuid, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(16);
        let id = Uuid::new_v4();
        hub.register(id, tx, None);
        (id, rx)
    }

    fn decode(frame: Outbound) -> ServerMessage {
        match frame {
            Outbound::Text(text) => serde_json::from_str(&text).unwrap(),
            Outbound::Close => panic!("unexpected close"),
        }
    }

    #[test]
    fn empty_window_sends_no_manifest() {
        let mut hub = SignalingHub::new(20);
        let (_, mut rx) = connect(&mut hub);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn catch_up_manifest_precedes_live_chunks() {
        let mut hub = SignalingHub::new(3);
        let (broadcaster, _brx) = connect(&mut hub);
        for seq in 1..=5 {
            hub.ingest_chunk(broadcaster, chunk(seq));
        }

        let (_, mut rx) = connect(&mut hub);
        hub.ingest_chunk(broadcaster, chunk(6));

        match decode(rx.try_recv().unwrap()) {
            ServerMessage::Manifest { chunks, stats } => {
                assert_eq!(chunks.iter().map(|c| c.seq).collect::<Vec<_>>(), vec![3, 4, 5]);
                assert_eq!(stats.total_chunks, 5);
                assert_eq!(stats.active_viewers, 0);
            }
            other => panic!("expected manifest, got {:?}", other),
        }
        assert!(matches!(decode(rx.try_recv().unwrap()), ServerMessage::Chunk(c) if c.seq == 6));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn one_dead_viewer_does_not_block_the_rest() {
        let mut hub = SignalingHub::new(20);
        let (broadcaster, _brx) = connect(&mut hub);
        let (_, mut a) = connect(&mut hub);
        let (_, dead) = connect(&mut hub);
        let (_, mut c) = connect(&mut hub);
        drop(dead);

        let report = hub.ingest_chunk(broadcaster, chunk(1));
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(hub.stats().failed_sends, 1);
        assert!(a.try_recv().is_ok());
        assert!(c.try_recv().is_ok());
    }

    #[test]
    fn full_queue_counts_as_failure() {
        let mut hub = SignalingHub::new(20);
        let (broadcaster, _brx) = connect(&mut hub);
        let (tx, _rx) = mpsc::channel(1);
        hub.register(Uuid::new_v4(), tx, None);

        assert_eq!(hub.ingest_chunk(broadcaster, chunk(1)).delivered, 1);
        let report = hub.ingest_chunk(broadcaster, chunk(2));
        assert_eq!(report.failed, 1);
        assert_eq!(hub.sweep(), 0);
    }

    #[test]
    fn promotion_is_one_way_and_sender_gets_no_echo() {
        let mut hub = SignalingHub::new(20);
        let (id, mut rx) = connect(&mut hub);
        assert_eq!(hub.role_of(&id), Some(ConnectionRole::Viewer));

        hub.handle_message(id, ClientMessage::Chunk(chunk(1)));
        assert_eq!(hub.role_of(&id), Some(ConnectionRole::Broadcaster));
        assert!(rx.try_recv().is_err());

        hub.handle_message(id, ClientMessage::Ping {});
        hub.handle_message(id, ClientMessage::Stats {});
        assert_eq!(hub.role_of(&id), Some(ConnectionRole::Broadcaster));
        assert!(matches!(decode(rx.try_recv().unwrap()), ServerMessage::Pong { .. }));
        match decode(rx.try_recv().unwrap()) {
            ServerMessage::Stats(stats) => {
                assert_eq!(stats.active_broadcasters, 1);
                assert_eq!(stats.active_viewers, 0);
                assert_eq!(stats.manifest_chunks, 1);
            }
            other => panic!("expected stats, got {:?}", other),
        }
    }

    #[test]
    fn duplicate_announcement_is_ignored() {
        let mut hub = SignalingHub::new(20);
        let (broadcaster, _brx) = connect(&mut hub);
        let (_, mut viewer) = connect(&mut hub);

        hub.ingest_chunk(broadcaster, chunk(1));
        let report = hub.ingest_chunk(broadcaster, chunk(1));
        assert!(report.duplicate);
        assert_eq!(hub.window_len(), 1);
        assert_eq!(hub.stats().total_chunks, 1);
        assert!(viewer.try_recv().is_ok());
        assert!(viewer.try_recv().is_err());
    }

    #[test]
    fn sweep_removes_closed_connections() {
        let mut hub = SignalingHub::new(20);
        let (_, rx) = connect(&mut hub);
        let (closing, _keep) = connect(&mut hub);
        let (_, _alive) = connect(&mut hub);
        drop(rx);
        hub.mark_closing(&closing);

        assert_eq!(hub.sweep(), 2);
        assert_eq!(hub.connection_count(), 1);
    }

    #[test]
    fn shutdown_notifies_and_closes_everyone() {
        let mut hub = SignalingHub::new(20);
        let (broadcaster, mut brx) = connect(&mut hub);
        hub.ingest_chunk(broadcaster, chunk(1));
        let (_, mut vrx) = connect(&mut hub);
        vrx.try_recv().unwrap(); // manifest

        assert_eq!(hub.shutdown_notice(), 2);
        for rx in [&mut brx, &mut vrx] {
            assert!(matches!(decode(rx.try_recv().unwrap()), ServerMessage::ServerShutdown { .. }));
            assert_eq!(rx.try_recv().unwrap(), Outbound::Close);
        }
        assert_eq!(hub.sweep(), 2);
    }

    #[test]
    fn unregister_reports_role() {
        let mut hub = SignalingHub::new(20);
        let (id, _rx) = connect(&mut hub);
        hub.ingest_chunk(id, chunk(1));
        assert_eq!(hub.unregister(&id), Some(ConnectionRole::Broadcaster));
        assert_eq!(hub.unregister(&id), None);
    }
}
