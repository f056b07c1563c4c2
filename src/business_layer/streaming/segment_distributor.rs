use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use super::chunk_types::ChunkDescriptor;
use super::manifest_store::{ManifestError, ManifestStore};
use super::session_tracker::SessionTracker;
use crate::business_layer::monitoring::{ChunkReport, MetricsCollector};
use crate::config::Config;
use crate::data_layer::storage::{object_key, DurableStore};
use crate::data_layer::swarm::{PeerSwarm, SwarmHandle};
use crate::data_layer::watcher::{DetectedSegment, ProcessedSegments};
use crate::utils::log_error::LogError;

#[derive(Debug, Clone)]
pub struct DistributorSettings {
    pub key_prefix: String,
    pub trackers: Vec<String>,
    /// Base of this process's `/chunks/` route, if viewers can reach it.
    pub origin_base_url: Option<String>,
    pub upload_timeout: Duration,
    pub seed_timeout: Duration,
    pub retention: Duration,
    pub idle_threshold: Duration,
    pub idle_check_interval: Duration,
    pub delete_durable_on_retire: bool,
}

impl DistributorSettings {
    pub fn from_config(config: &Config) -> Self {
        let origin = config.server.public_base_url.trim_end_matches('/');
        Self {
            key_prefix: config.s3.key_prefix.clone(),
            trackers: config.swarm.trackers.clone(),
            origin_base_url: (!origin.is_empty()).then(|| origin.to_string()),
            upload_timeout: Duration::from_secs(config.s3.upload_timeout_secs),
            seed_timeout: Duration::from_secs(config.swarm.seed_timeout_secs),
            retention: config.watcher.retention(),
            idle_threshold: config.watcher.idle_threshold(),
            idle_check_interval: config.watcher.idle_check_interval(),
            delete_durable_on_retire: config.s3.delete_on_retire,
        }
    }
}

#[derive(Debug)]
struct TrackedChunk {
    path: PathBuf,
    seeding: Option<SwarmHandle>,
    object_key: Option<String>,
}

/// Keyed by session so a stale retirement never touches a reused filename.
type ChunkKey = (String, String);

struct DistributorState {
    session: SessionTracker,
    tracked: HashMap<ChunkKey, TrackedChunk>,
}

/// Publishes detected segments: durable upload, swarm seeding, announcement,
/// retention-based retirement. Owns session and restart handling.
#[derive(Clone)]
pub struct SegmentDistributor {
    state: Arc<Mutex<DistributorState>>,
    manifest: Arc<RwLock<ManifestStore>>,
    processed: ProcessedSegments,
    store: Option<Arc<dyn DurableStore>>,
    swarm: Option<Arc<dyn PeerSwarm>>,
    announcer: mpsc::Sender<ChunkDescriptor>,
    metrics: Arc<MetricsCollector>,
    settings: Arc<DistributorSettings>,
}

impl SegmentDistributor {
    pub fn new(
        settings: DistributorSettings,
        manifest: Arc<RwLock<ManifestStore>>,
        processed: ProcessedSegments,
        announcer: mpsc::Sender<ChunkDescriptor>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(DistributorState {
                session: SessionTracker::new(),
                tracked: HashMap::new(),
            })),
            manifest,
            processed,
            store: None,
            swarm: None,
            announcer,
            metrics,
            settings: Arc::new(settings),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_swarm(mut self, swarm: Arc<dyn PeerSwarm>) -> Self {
        self.swarm = Some(swarm);
        self
    }

    pub async fn current_session_id(&self) -> String {
        self.state.lock().await.session.session().id.clone()
    }

    pub async fn active_seedings(&self) -> usize {
        let state = self.state.lock().await;
        state.tracked.values().filter(|t| t.seeding.is_some()).count()
    }

    pub async fn tracked_chunks(&self) -> usize {
        self.state.lock().await.tracked.len()
    }

    /// Consumes detected segments and runs the idle timer until the watcher stops.
    pub async fn run(self, mut segments: mpsc::Receiver<DetectedSegment>) {
        let mut idle_tick = tokio::time::interval(self.settings.idle_check_interval);
        loop {
            tokio::select! {
                segment = segments.recv() => match segment {
                    Some(segment) => {
                        self.handle_segment(segment).await;
                    }
                    None => break,
                },
                _ = idle_tick.tick() => self.check_idle().await,
            }
        }
        self.shutdown().await;
    }

    /// Marks the session ended after the idle threshold. Chunks keep their
    /// seedings and retirement timers; only the processed names are
    /// forgotten, since the next encoder run reuses them.
    pub async fn check_idle(&self) {
        let mut state = self.state.lock().await;
        if state.session.check_idle(Instant::now(), self.settings.idle_threshold) {
            info!(
                "⏸️ Stream stopped ({}s without segments), session {} will reset on next segment",
                self.settings.idle_threshold.as_secs(),
                state.session.session().id
            );
            let forgotten = self.processed.clear();
            debug!("Forgot {} processed segment names", forgotten);
        }
    }

    pub async fn session_ended(&self) -> bool {
        self.state.lock().await.session.is_ended()
    }

    pub async fn session_transitions(&self) -> u64 {
        self.state.lock().await.session.transitions()
    }

    /// Assigns the segment its slot and publishes it on its own task.
    pub async fn handle_segment(&self, segment: DetectedSegment) -> JoinHandle<ChunkReport> {
        let path = segment.path.clone();
        let chunk = self.accept(segment).await;
        info!(
            "📦 New chunk #{}: {} ({:.2} KB)",
            chunk.seq,
            chunk.filename,
            chunk.size as f64 / 1024.0
        );
        tokio::spawn(self.clone().publish(chunk, path))
    }

    async fn accept(&self, segment: DetectedSegment) -> ChunkDescriptor {
        let (chunk, restarted, torn_down) = {
            let mut state = self.state.lock().await;
            let slot = state.session.begin_segment(Instant::now());

            let mut torn_down = Vec::new();
            if slot.restarted {
                for tracked in state.tracked.values_mut() {
                    torn_down.extend(tracked.seeding.take());
                }
            }

            let replaced = state.tracked.insert(
                (slot.session_id.clone(), segment.filename.clone()),
                TrackedChunk {
                    path: segment.path.clone(),
                    seeding: None,
                    object_key: None,
                },
            );
            if let Some(replaced) = replaced {
                warn!("{} accepted twice in one session", segment.filename);
                torn_down.extend(replaced.seeding);
            }

            let mut chunk = ChunkDescriptor::new(slot.seq, segment.filename.clone(), slot.session_id);
            chunk.size = segment.size;
            chunk.timestamp = segment.detected_at.timestamp_millis();
            chunk.discontinuity = slot.discontinuity;
            (chunk, slot.restarted, torn_down)
        };

        if restarted {
            info!("🔄 Stream restart detected, new session {}", chunk.session_id);
            let cleared = {
                let mut manifest = self.manifest.write().await;
                let cleared = manifest.len();
                manifest.begin_session(&chunk.session_id, true);
                cleared
            };
            info!("Cleared {} chunks from manifest, stopping {} seedings", cleared, torn_down.len());
            self.metrics.record_session_start().await;
        }
        for handle in torn_down {
            self.stop_seeding(handle).await;
        }

        chunk
    }

    /// Upload, seed, announce, schedule retirement. Each step fails independently.
    async fn publish(self, mut chunk: ChunkDescriptor, path: PathBuf) -> ChunkReport {
        if let Some(store) = &self.store {
            let key = object_key(&self.settings.key_prefix, &chunk.session_id, &chunk.filename);
            match timeout(self.settings.upload_timeout, store.put_segment(&path, &key)).await {
                Ok(Ok(url)) => {
                    chunk.durable_url = Some(url);
                    self.attach_object_key(&chunk, key).await;
                }
                Ok(Err(e)) => warn!("Upload failed for {}: {}", chunk.filename, e),
                Err(_) => warn!("Upload timed out for {}", chunk.filename),
            }
        }

        if let Some(swarm) = &self.swarm {
            match timeout(self.settings.seed_timeout, swarm.seed(&path, &self.settings.trackers)).await {
                Ok(Ok(handle)) => {
                    if self.attach_seeding(&chunk, handle.clone()).await {
                        chunk.swarm_locator = Some(handle.locator);
                        chunk.info_hash = Some(handle.info_hash);
                    }
                }
                Ok(Err(e)) => warn!("Seeding failed for {}: {}", chunk.filename, e),
                Err(_) => warn!("Seeding timed out for {}", chunk.filename),
            }
        }

        chunk.origin_url = self
            .settings
            .origin_base_url
            .as_ref()
            .map(|base| format!("{}/chunks/{}", base, chunk.filename));
        chunk.settle_sources();

        let added = self.manifest.write().await.add_chunk(chunk.clone());
        match added {
            Ok(evicted) => {
                for old in evicted {
                    self.retire(&old.session_id, &old.filename).await;
                }
            }
            Err(ManifestError::StaleSession(name)) => debug!("Not listing {} from a finished session", name),
            Err(e) => warn!("Not listing chunk in manifest: {}", e),
        }

        let announced = match self.announcer.try_send(chunk.clone()) {
            Ok(()) => true,
            Err(e) => {
                warn!("Could not queue announcement for {}: {}", chunk.filename, e);
                false
            }
        };

        let report = ChunkReport {
            seq: chunk.seq,
            filename: chunk.filename.clone(),
            session_id: chunk.session_id.clone(),
            size: chunk.size,
            uploaded: chunk.durable_url.is_some(),
            seeded: chunk.swarm_locator.is_some(),
            origin_only: chunk.origin_only,
            announced,
            published_at: Utc::now(),
        };
        self.metrics.record_chunk(report.clone()).await;

        let retention = self.settings.retention;
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            this.retire(&chunk.session_id, &chunk.filename).await;
        });

        report
    }

    /// Records a finished seeding unless the chunk's session has been replaced
    /// or the chunk retired meanwhile, in which case the seeding is stopped.
    async fn attach_seeding(&self, chunk: &ChunkDescriptor, handle: SwarmHandle) -> bool {
        let attached = {
            let mut state = self.state.lock().await;
            let live = state.session.session().id == chunk.session_id;
            match state.tracked.get_mut(&(chunk.session_id.clone(), chunk.filename.clone())) {
                Some(tracked) if live => {
                    tracked.seeding = Some(handle.clone());
                    true
                }
                _ => false,
            }
        };
        if !attached {
            self.stop_seeding(handle).await;
        }
        attached
    }

    async fn attach_object_key(&self, chunk: &ChunkDescriptor, key: String) {
        let mut state = self.state.lock().await;
        if let Some(tracked) = state.tracked.get_mut(&(chunk.session_id.clone(), chunk.filename.clone())) {
            tracked.object_key = Some(key);
        }
    }

    async fn stop_seeding(&self, handle: SwarmHandle) {
        if let Some(swarm) = &self.swarm {
            swarm
                .destroy(&handle.locator)
                .await
                .log_error(&format!("Failed to stop seeding {}", handle.info_hash));
        }
    }

    /// Stops seeding, deletes the local file and drops bookkeeping. Idempotent.
    pub async fn retire(&self, session_id: &str, filename: &str) -> bool {
        let (tracked, path_in_use) = {
            let mut state = self.state.lock().await;
            let Some(tracked) = state.tracked.remove(&(session_id.to_string(), filename.to_string())) else {
                return false;
            };
            let in_use = state.tracked.values().any(|t| t.path == tracked.path);
            // A later session may have claimed the same name.
            if !state.tracked.keys().any(|(_, name)| name == filename) {
                self.processed.release(filename);
            }
            (tracked, in_use)
        };

        debug!("🧹 Retiring chunk {} of session {}", filename, session_id);

        if let Some(handle) = tracked.seeding {
            self.stop_seeding(handle).await;
        }

        if !path_in_use {
            match tokio::fs::remove_file(&tracked.path).await {
                Ok(()) => debug!("Local file deleted: {}", tracked.path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Could not delete {}: {}", tracked.path.display(), e),
            }
        }

        if self.settings.delete_durable_on_retire {
            if let (Some(store), Some(key)) = (&self.store, &tracked.object_key) {
                store
                    .delete(key)
                    .await
                    .log_error(&format!("Failed to delete durable copy {}", key));
            }
        }

        self.manifest.write().await.remove(session_id, filename);
        self.metrics.record_retired().await;
        true
    }

    /// Stops every active seeding.
    pub async fn shutdown(&self) {
        let handles: Vec<SwarmHandle> = {
            let mut state = self.state.lock().await;
            state.tracked.values_mut().filter_map(|t| t.seeding.take()).collect()
        };
        info!("Stopping {} seedings", handles.len());
        for handle in handles {
            self.stop_seeding(handle).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ManifestConfig, WatcherConfig};
    use crate::data_layer::watcher::SegmentWatcher;
    use crate::error::{StorageError, SwarmError};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeStore {
        fail: AtomicBool,
        keys: StdMutex<Vec<String>>,
        deleted: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl DurableStore for FakeStore {
        async fn put_segment(&self, _path: &Path, key: &str) -> Result<String, StorageError> {
            self.keys.lock().unwrap().push(key.to_string());
            if self.fail.load(Ordering::SeqCst) {
                return Err(StorageError::Request("bucket unavailable".into()));
            }
            Ok(format!("https://cdn.test/{}", key))
        }

        async fn exists(&self, _key: &str) -> Result<bool, StorageError> {
            Ok(true)
        }

        async fn delete(&self, key: &str) -> Result<(), StorageError> {
            self.deleted.lock().unwrap().push(key.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeSwarm {
        fail: AtomicBool,
        seeds: AtomicUsize,
        destroyed: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl PeerSwarm for FakeSwarm {
        async fn seed(&self, path: &Path, _trackers: &[String]) -> Result<SwarmHandle, SwarmError> {
            self.seeds.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(SwarmError::Status(503));
            }
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            Ok(SwarmHandle {
                locator: format!("magnet:?xt=urn:btih:{}", name),
                info_hash: name,
            })
        }

        async fn fetch(&self, _locator: &str, _timeout: Duration) -> Result<Bytes, SwarmError> {
            Err(SwarmError::Timeout)
        }

        async fn destroy(&self, locator: &str) -> Result<(), SwarmError> {
            self.destroyed.lock().unwrap().push(locator.to_string());
            Ok(())
        }
    }

    struct Harness {
        distributor: SegmentDistributor,
        manifest: Arc<RwLock<ManifestStore>>,
        processed: ProcessedSegments,
        store: Arc<FakeStore>,
        swarm: Arc<FakeSwarm>,
        announcements: mpsc::Receiver<ChunkDescriptor>,
        dir: tempfile::TempDir,
    }

    fn settings() -> DistributorSettings {
        DistributorSettings {
            key_prefix: "live/".into(),
            trackers: vec!["wss://tracker.test".into()],
            origin_base_url: Some("http://origin.test:3000".into()),
            upload_timeout: Duration::from_secs(5),
            seed_timeout: Duration::from_secs(5),
            retention: Duration::from_secs(3600),
            idle_threshold: Duration::from_millis(50),
            idle_check_interval: Duration::from_millis(10),
            delete_durable_on_retire: false,
        }
    }

    fn harness(settings: DistributorSettings, max_chunks: usize) -> Harness {
        let manifest = Arc::new(RwLock::new(ManifestStore::new(&ManifestConfig {
            max_chunks,
            ..ManifestConfig::default()
        })));
        let processed = ProcessedSegments::new();
        let store = Arc::new(FakeStore::default());
        let swarm = Arc::new(FakeSwarm::default());
        let (tx, rx) = mpsc::channel(64);
        let distributor = SegmentDistributor::new(
            settings,
            manifest.clone(),
            processed.clone(),
            tx,
            Arc::new(MetricsCollector::new()),
        )
        .with_store(store.clone())
        .with_swarm(swarm.clone());

        Harness {
            distributor,
            manifest,
            processed,
            store,
            swarm,
            announcements: rx,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    impl Harness {
        fn segment(&self, name: &str) -> DetectedSegment {
            let path = self.dir.path().join(name);
            std::fs::write(&path, vec![1u8; 376]).unwrap();
            self.processed.claim(name);
            DetectedSegment {
                path,
                filename: name.to_string(),
                size: 376,
                detected_at: Utc::now(),
            }
        }

        async fn publish(&self, name: &str) -> ChunkReport {
            let segment = self.segment(name);
            self.distributor.handle_segment(segment).await.await.unwrap()
        }
    }

    #[tokio::test]
    async fn publishes_with_every_source() {
        let mut h = harness(settings(), 10);
        let report = h.publish("stream0001.ts").await;
        assert!(report.uploaded && report.seeded && report.announced);

        let chunk = h.announcements.recv().await.unwrap();
        let session = h.distributor.current_session_id().await;
        assert_eq!(chunk.seq, 1);
        assert_eq!(chunk.session_id, session);
        assert_eq!(
            chunk.durable_url.as_deref(),
            Some(format!("https://cdn.test/live/{}/stream0001.ts", session).as_str())
        );
        assert_eq!(chunk.swarm_locator.as_deref(), Some("magnet:?xt=urn:btih:stream0001.ts"));
        assert_eq!(chunk.origin_url.as_deref(), Some("http://origin.test:3000/chunks/stream0001.ts"));
        assert!(!chunk.origin_only && !chunk.discontinuity);

        assert_eq!(h.manifest.read().await.len(), 1);
        assert_eq!(h.distributor.active_seedings().await, 1);
    }

    #[tokio::test]
    async fn upload_failure_still_announces() {
        let mut h = harness(settings(), 10);
        h.store.fail.store(true, Ordering::SeqCst);

        let report = h.publish("stream0001.ts").await;
        assert!(!report.uploaded && report.seeded && report.announced);

        let chunk = h.announcements.recv().await.unwrap();
        assert!(chunk.durable_url.is_none());
        assert!(chunk.swarm_locator.is_some());

        // The manifest falls back to the origin URL.
        assert!(h.manifest.read().await.render().contains("http://origin.test:3000/chunks/stream0001.ts"));
    }

    #[tokio::test]
    async fn total_failure_is_announced_origin_only() {
        let mut s = settings();
        s.origin_base_url = None;
        let mut h = harness(s, 10);
        h.store.fail.store(true, Ordering::SeqCst);
        h.swarm.fail.store(true, Ordering::SeqCst);

        let report = h.publish("stream0001.ts").await;
        assert!(report.origin_only);
        let chunk = h.announcements.recv().await.unwrap();
        assert!(chunk.origin_only);
        assert!(chunk.http_url().is_none());
        // Nothing to list without a delivery URL.
        assert!(h.manifest.read().await.is_empty());
    }

    #[tokio::test]
    async fn restart_after_idle_resets_session() {
        let mut h = harness(settings(), 10);
        h.publish("stream0001.ts").await;
        h.publish("stream0002.ts").await;
        let first_session = h.distributor.current_session_id().await;

        tokio::time::sleep(Duration::from_millis(80)).await;
        h.distributor.check_idle().await;
        // Ended but not cleared yet.
        assert_eq!(h.manifest.read().await.len(), 2);

        h.publish("stream0003.ts").await;
        let second_session = h.distributor.current_session_id().await;
        assert_ne!(first_session, second_session);

        let announced: Vec<ChunkDescriptor> = (0..3).map(|_| h.announcements.try_recv().unwrap()).collect();
        assert_eq!(announced[2].seq, 1);
        assert!(announced[2].discontinuity);
        assert_eq!(announced[2].session_id, second_session);

        let destroyed = h.swarm.destroyed.lock().unwrap().clone();
        assert_eq!(destroyed.len(), 2);
        assert_eq!(h.distributor.active_seedings().await, 1);

        let manifest = h.manifest.read().await;
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.discontinuity_sequence(), 1);
        let playlist = manifest.render();
        assert!(playlist.contains("#EXT-X-DISCONTINUITY-SEQUENCE:1"));
        assert!(playlist.contains("#EXT-X-DISCONTINUITY\n#EXTINF:6.000,\n"));
        assert!(h.store.keys.lock().unwrap()[2].starts_with(&format!("live/{}/", second_session)));
    }

    #[tokio::test]
    async fn encoder_restart_may_reuse_names() {
        let h = harness(settings(), 10);
        h.publish("stream0001.ts").await;
        h.publish("stream0002.ts").await;
        let first_session = h.distributor.current_session_id().await;

        tokio::time::sleep(Duration::from_millis(80)).await;
        h.distributor.check_idle().await;
        assert!(h.distributor.session_ended().await);
        assert_eq!(h.processed.len(), 0);

        // The next run rewrites stream0001.ts in place.
        let path = h.dir.path().join("stream0001.ts");
        std::fs::write(&path, vec![5u8; 188]).unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let watcher = SegmentWatcher::new(
            &WatcherConfig {
                watch_dir: h.dir.path().to_path_buf(),
                stability_delay_ms: 5,
                ..WatcherConfig::default()
            },
            h.processed.clone(),
            tx,
        );
        assert!(watcher.consider(&path).await);
        let report = h.distributor.handle_segment(rx.recv().await.unwrap()).await.await.unwrap();
        assert_eq!(report.seq, 1);
        assert_ne!(report.session_id, first_session);
        assert_eq!(h.distributor.session_transitions().await, 1);

        // Retiring the old chunk keeps the new file and its claim.
        assert!(h.distributor.retire(&first_session, "stream0001.ts").await);
        assert!(path.exists());
        assert!(h.processed.is_processed("stream0001.ts"));
        assert!(!watcher.consider(&path).await);
    }

    #[tokio::test]
    async fn retention_retires_chunk() {
        let mut s = settings();
        s.retention = Duration::from_millis(30);
        let h = harness(s, 10);
        let path = h.dir.path().join("stream0001.ts");

        h.publish("stream0001.ts").await;
        assert!(path.exists());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!path.exists());
        assert_eq!(h.distributor.tracked_chunks().await, 0);
        assert_eq!(h.distributor.active_seedings().await, 0);
        assert_eq!(h.processed.len(), 0);
        assert!(h.manifest.read().await.is_empty());
        assert_eq!(h.swarm.destroyed.lock().unwrap().len(), 1);
        assert!(h.store.deleted.lock().unwrap().is_empty());

        // A second retirement is a no-op.
        let session = h.distributor.current_session_id().await;
        assert!(!h.distributor.retire(&session, "stream0001.ts").await);
    }

    #[tokio::test]
    async fn retirement_can_delete_durable_copy() {
        let mut s = settings();
        s.delete_durable_on_retire = true;
        let h = harness(s, 10);
        h.publish("stream0001.ts").await;

        let session = h.distributor.current_session_id().await;
        assert!(h.distributor.retire(&session, "stream0001.ts").await);
        assert_eq!(
            *h.store.deleted.lock().unwrap(),
            vec![format!("live/{}/stream0001.ts", session)]
        );
    }

    #[tokio::test]
    async fn window_overflow_retires_early() {
        let h = harness(settings(), 2);
        for n in 1..=3 {
            h.publish(&format!("stream000{}.ts", n)).await;
        }

        assert!(!h.dir.path().join("stream0001.ts").exists());
        assert!(h.dir.path().join("stream0003.ts").exists());
        assert_eq!(h.distributor.tracked_chunks().await, 2);
        let seqs: Vec<u64> = h.manifest.read().await.snapshot().iter().map(|c| c.seq).collect();
        assert_eq!(seqs, vec![2, 3]);
    }

    #[tokio::test]
    async fn redetection_does_not_republish() {
        let h = harness(settings(), 10);
        let path = h.dir.path().join("stream0001.ts");
        std::fs::write(&path, vec![3u8; 188]).unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let watcher = SegmentWatcher::new(
            &WatcherConfig {
                watch_dir: h.dir.path().to_path_buf(),
                stability_delay_ms: 5,
                ..WatcherConfig::default()
            },
            h.processed.clone(),
            tx,
        );
        watcher.consider(&path).await;
        watcher.consider(&path).await;
        drop(watcher);

        while let Some(segment) = rx.recv().await {
            h.distributor.handle_segment(segment).await.await.unwrap();
        }
        assert_eq!(h.store.keys.lock().unwrap().len(), 1);
        assert_eq!(h.swarm.seeds.load(Ordering::SeqCst), 1);
        assert_eq!(h.manifest.read().await.len(), 1);
    }
}
