use bytes::Bytes;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::chunk_fetcher::{ChunkDownloader, DeliveryMode};
use super::decode_buffer::DecodeBuffer;
use crate::business_layer::streaming::ChunkDescriptor;
use crate::config::ViewerConfig;
use crate::error::FetchError;

/// What the signaling listener hands to the engine.
#[derive(Debug, Clone)]
pub enum ViewerEvent {
    Manifest(Vec<ChunkDescriptor>),
    Chunk(ChunkDescriptor),
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub buffer_target: usize,
    pub max_retained_secs: f64,
    pub trim_interval: Duration,
    pub stats_interval: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &ViewerConfig) -> Self {
        Self {
            buffer_target: config.buffer_target.max(1),
            max_retained_secs: config.max_buffer_secs,
            trim_interval: Duration::from_millis(config.trim_interval_ms),
            stats_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStats {
    pub mode: DeliveryMode,
    pub session_id: Option<String>,
    pub chunks_loaded: u64,
    pub chunks_skipped: u64,
    pub p2p_bytes: u64,
    pub http_bytes: u64,
    pub p2p_failures: u64,
    pub pending: usize,
}

/// (engine epoch, sequence number). Epochs order sessions as the engine saw them.
type SlotKey = (u64, u64);

#[derive(Debug)]
enum Slot {
    Downloading,
    Ready(Bytes),
    Failed,
}

#[derive(Debug)]
pub struct Completed {
    key: SlotKey,
    filename: String,
    result: Result<Bytes, FetchError>,
}

/// Per-viewer delivery: schedules downloads, reorders completions and feeds
/// the decode buffer strictly by sequence.
pub struct ViewerDeliveryEngine<B: DecodeBuffer> {
    downloader: Arc<ChunkDownloader>,
    buffer: B,
    settings: EngineSettings,
    session_id: Option<String>,
    retired_sessions: HashSet<String>,
    epoch: u64,
    seen: HashSet<String>,
    pending: BTreeMap<SlotKey, Slot>,
    last_appended: Option<SlotKey>,
    downloads: JoinSet<Completed>,
    chunks_loaded: u64,
    chunks_skipped: u64,
}

impl<B: DecodeBuffer> ViewerDeliveryEngine<B> {
    pub fn new(downloader: Arc<ChunkDownloader>, buffer: B, settings: EngineSettings) -> Self {
        let epoch = downloader.epoch();
        Self {
            downloader,
            buffer,
            settings,
            session_id: None,
            retired_sessions: HashSet::new(),
            epoch,
            seen: HashSet::new(),
            pending: BTreeMap::new(),
            last_appended: None,
            downloads: JoinSet::new(),
            chunks_loaded: 0,
            chunks_skipped: 0,
        }
    }

    pub fn mode(&self) -> DeliveryMode {
        self.downloader.mode()
    }

    pub fn buffer_mut(&mut self) -> &mut B {
        &mut self.buffer
    }

    pub fn in_flight(&self) -> usize {
        self.downloads.len()
    }

    pub fn stats(&self) -> EngineStats {
        let transfer = self.downloader.stats();
        EngineStats {
            mode: self.downloader.mode(),
            session_id: self.session_id.clone(),
            chunks_loaded: self.chunks_loaded,
            chunks_skipped: self.chunks_skipped,
            p2p_bytes: transfer.p2p_bytes,
            http_bytes: transfer.http_bytes,
            p2p_failures: transfer.p2p_failures,
            pending: self.pending.len(),
        }
    }

    pub fn on_event(&mut self, event: ViewerEvent) {
        match event {
            ViewerEvent::Manifest(chunks) => self.on_manifest(chunks),
            ViewerEvent::Chunk(chunk) => {
                self.schedule(chunk);
            }
        }
    }

    /// Catch-up: only the newest `buffer_target` chunks of the newest
    /// session are worth fetching. The hub window can still hold the tail
    /// of an earlier session.
    pub fn on_manifest(&mut self, chunks: Vec<ChunkDescriptor>) {
        info!("Received manifest with {} chunks", chunks.len());
        let Some(live) = newest_session(&chunks).map(str::to_string) else {
            return;
        };
        let mut chunks: Vec<ChunkDescriptor> = chunks.into_iter().filter(|c| c.session_id == live).collect();
        chunks.sort_by_key(|c| c.seq);
        let skip = chunks.len().saturating_sub(self.settings.buffer_target);
        for chunk in chunks.into_iter().skip(skip) {
            self.schedule(chunk);
        }
    }

    /// Starts a download for `chunk` unless it was already seen, belongs to a
    /// finished session or would land behind what has been appended.
    pub fn schedule(&mut self, chunk: ChunkDescriptor) -> bool {
        if self.retired_sessions.contains(&chunk.session_id) {
            debug!("Ignoring {} from finished session {}", chunk.filename, chunk.session_id);
            return false;
        }
        if self.session_id.as_deref() != Some(chunk.session_id.as_str()) {
            let earlier = self
                .session_id
                .as_deref()
                .is_some_and(|current| is_older_session(&chunk.session_id, current));
            if earlier {
                debug!("Ignoring {} from earlier session {}", chunk.filename, chunk.session_id);
                return false;
            }
            self.enter_session(&chunk.session_id);
        }
        if !self.seen.insert(chunk.filename.clone()) {
            return false;
        }

        let key = (self.epoch, chunk.seq);
        if self.last_appended.is_some_and(|last| key <= last) || self.pending.contains_key(&key) {
            debug!("Chunk {} arrived too late to play", chunk.filename);
            return false;
        }

        self.pending.insert(key, Slot::Downloading);
        let downloader = self.downloader.clone();
        let epoch = self.epoch;
        self.downloads.spawn(async move {
            let result = downloader.download(&chunk, epoch).await;
            Completed {
                key,
                filename: chunk.filename,
                result,
            }
        });
        true
    }

    fn enter_session(&mut self, session_id: &str) {
        if let Some(previous) = self.session_id.replace(session_id.to_string()) {
            info!("New stream session {} (was {}), resetting delivery state", session_id, previous);
            self.retired_sessions.insert(previous);
            self.epoch = self.downloader.reset_session();
            self.seen.clear();
        }
    }

    pub fn complete(&mut self, done: Completed) {
        let Some(slot) = self.pending.get_mut(&done.key) else {
            return;
        };
        *slot = match done.result {
            Ok(bytes) => Slot::Ready(bytes),
            Err(e) => {
                warn!("Chunk {} could not be downloaded: {}", done.filename, e);
                Slot::Failed
            }
        };
    }

    /// Appends every leading completed chunk, in order, while the buffer
    /// accepts data. Failed chunks are skipped so they cannot stall the rest.
    pub async fn drain(&mut self) -> usize {
        let mut appended = 0;
        loop {
            match self.pending.first_key_value() {
                None | Some((_, Slot::Downloading)) => break,
                Some((_, Slot::Ready(_))) if !self.buffer.is_ready() => break,
                Some(_) => {}
            }
            let Some((key, slot)) = self.pending.pop_first() else {
                break;
            };
            self.last_appended = Some(key);

            match slot {
                Slot::Ready(bytes) => match self.buffer.append(bytes).await {
                    Ok(()) => {
                        self.chunks_loaded += 1;
                        appended += 1;
                    }
                    Err(e) => {
                        warn!("Decode buffer rejected chunk #{}: {}", key.1, e);
                        self.chunks_skipped += 1;
                    }
                },
                Slot::Failed => self.chunks_skipped += 1,
                Slot::Downloading => {}
            }
        }
        appended
    }

    /// Removes material older than the retention window behind playback.
    pub async fn trim(&mut self) -> usize {
        let Some((start, _)) = self.buffer.buffered_range() else {
            return 0;
        };
        let boundary = self.buffer.playback_position() - self.settings.max_retained_secs;
        if boundary <= start {
            return 0;
        }
        match self.buffer.remove(start, boundary).await {
            Ok(removed) => {
                if removed > 0 {
                    debug!("Trimmed {} segment(s) behind {:.1}s", removed, boundary);
                }
                removed
            }
            Err(e) => {
                warn!("Trim failed: {}", e);
                0
            }
        }
    }

    /// Waits for the next finished download and drains. Returns `false` when
    /// nothing is in flight.
    pub async fn pump(&mut self) -> bool {
        match self.downloads.join_next().await {
            Some(Ok(done)) => {
                self.complete(done);
                self.drain().await;
                true
            }
            Some(Err(e)) => {
                warn!("Download task failed: {}", e);
                true
            }
            None => false,
        }
    }

    pub async fn run(mut self, mut events: mpsc::Receiver<ViewerEvent>) -> EngineStats {
        let mut trim_tick = tokio::time::interval(self.settings.trim_interval);
        let mut stats_tick = tokio::time::interval(self.settings.stats_interval);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.on_event(event),
                    None => break,
                },
                Some(joined) = self.downloads.join_next(), if !self.downloads.is_empty() => match joined {
                    Ok(done) => self.complete(done),
                    Err(e) => warn!("Download task failed: {}", e),
                },
                _ = trim_tick.tick() => {
                    self.trim().await;
                }
                _ = stats_tick.tick() => {
                    let stats = self.stats();
                    info!(
                        "📊 mode={:?} loaded={} skipped={} p2p={}B http={}B p2p_failures={}",
                        stats.mode, stats.chunks_loaded, stats.chunks_skipped, stats.p2p_bytes, stats.http_bytes, stats.p2p_failures
                    );
                }
            }
            self.drain().await;
        }

        self.downloads.abort_all();
        self.stats()
    }
}

/// Session ids are start times in unix milliseconds. Ids that do not parse
/// are never considered older.
fn is_older_session(candidate: &str, current: &str) -> bool {
    match (candidate.parse::<i64>(), current.parse::<i64>()) {
        (Ok(candidate), Ok(current)) => candidate < current,
        _ => false,
    }
}

/// The newest session in hub order: later entries win unless their id is
/// provably older.
fn newest_session(chunks: &[ChunkDescriptor]) -> Option<&str> {
    chunks.iter().fold(None::<&str>, |newest, chunk| match newest {
        Some(id) if is_older_session(&chunk.session_id, id) => Some(id),
        _ => Some(chunk.session_id.as_str()),
    })
}
