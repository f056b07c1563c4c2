use chrono::{DateTime, Utc};
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::processed::ProcessedSegments;
use crate::config::WatcherConfig;
use crate::error::{SegmentProbeError, WatchError};

/// A finalized segment ready for distribution.
#[derive(Debug, Clone)]
pub struct DetectedSegment {
    pub path: PathBuf,
    pub filename: String,
    pub size: u64,
    pub detected_at: DateTime<Utc>,
}

/// Watches the encoder output directory and hands off stable, unseen segments.
pub struct SegmentWatcher {
    watch_dir: PathBuf,
    extension: String,
    stability_delay: Duration,
    processed: ProcessedSegments,
    segment_sender: mpsc::Sender<DetectedSegment>,
}

impl SegmentWatcher {
    pub fn new(
        config: &WatcherConfig,
        processed: ProcessedSegments,
        segment_sender: mpsc::Sender<DetectedSegment>,
    ) -> Self {
        Self {
            watch_dir: config.watch_dir.clone(),
            extension: config.segment_extension.trim_start_matches('.').to_string(),
            stability_delay: config.stability_delay(),
            processed,
            segment_sender,
        }
    }

    /// Filename of `path` if it is a visible file with the segment extension.
    pub fn candidate_name(path: &Path, extension: &str) -> Option<String> {
        let file_name = path.file_name()?.to_str()?;
        if file_name.starts_with('.') {
            return None;
        }
        let ext = path.extension()?.to_str()?;
        if ext != extension {
            return None;
        }
        Some(file_name.to_string())
    }

    /// Events that can mean a finished segment: creation, a rename into
    /// place or a writer closing the file. Plain data writes are ignored.
    pub fn is_arrival(kind: &EventKind) -> bool {
        matches!(
            kind,
            EventKind::Create(_)
                | EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both | RenameMode::Any))
                | EventKind::Access(AccessKind::Close(AccessMode::Write))
        )
    }

    /// A segment is stable once its size is non-zero and unchanged across `delay`.
    pub async fn probe_stability(path: &Path, delay: Duration) -> Result<u64, SegmentProbeError> {
        let before = Self::stat(path).await?;
        tokio::time::sleep(delay).await;
        let after = Self::stat(path).await?;

        if before != after {
            return Err(SegmentProbeError::Unstable { before, after });
        }
        if after == 0 {
            return Err(SegmentProbeError::Empty);
        }
        Ok(after)
    }

    async fn stat(path: &Path) -> Result<u64, SegmentProbeError> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(SegmentProbeError::Vanished),
            Err(e) => return Err(e.into()),
        };
        Ok(metadata.len())
    }

    /// Runs one path through filtering, dedupe and the stability probe.
    /// Returns `true` when the segment was handed off.
    pub async fn consider(&self, path: &Path) -> bool {
        let Some(filename) = Self::candidate_name(path, &self.extension) else {
            return false;
        };

        if self.processed.is_processed(&filename) {
            return false;
        }

        let size = match Self::probe_stability(path, self.stability_delay).await {
            Ok(stable) => stable,
            Err(e) => {
                // The writer closing the file re-triggers the probe.
                debug!("Skipping {} for now: {}", filename, e);
                return false;
            }
        };

        if !self.processed.claim(&filename) {
            return false;
        }

        let segment = DetectedSegment {
            path: path.to_path_buf(),
            filename,
            size,
            detected_at: Utc::now(),
        };
        if let Err(e) = self.segment_sender.send(segment).await {
            error!("Distributor is gone, dropping segment: {}", e.0.filename);
            return false;
        }
        true
    }

    /// Hands off segments already present in the directory, oldest name first.
    pub async fn initial_scan(&self) -> Result<usize, WatchError> {
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.watch_dir)
            .await
            .map_err(|_| WatchError::MissingDirectory(self.watch_dir.clone()))?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            paths.push(entry.path());
        }
        paths.sort();

        let mut handed_off = 0;
        for path in paths {
            if self.consider(&path).await {
                handed_off += 1;
            }
        }
        Ok(handed_off)
    }

    /// Watches the directory until the distributor goes away.
    pub async fn start_watching(self) -> Result<(), WatchError> {
        if !self.watch_dir.exists() {
            return Err(WatchError::MissingDirectory(self.watch_dir.clone()));
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let _ = tx.send(event);
            }
            Err(e) => error!("Watch error: {:?}", e),
        })?;
        watcher.watch(&self.watch_dir, RecursiveMode::NonRecursive)?;

        info!("👀 Watching {} for *.{} segments", self.watch_dir.display(), self.extension);

        let existing = self.initial_scan().await?;
        if existing > 0 {
            info!("Picked up {} existing segment(s)", existing);
        }

        while let Some(event) = rx.recv().await {
            if Self::is_arrival(&event.kind) {
                for path in event.paths {
                    self.consider(&path).await;
                }
            }
            if self.segment_sender.is_closed() {
                warn!("Segment channel closed, stopping watcher");
                break;
            }
        }

        drop(watcher);
        Ok(())
    }
}
