use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Filenames already handed to the distributor, shared by the watcher and the
/// distributor's retirement path.
///
/// A name stays claimed until its chunk is retired or the session goes idle,
/// so rewrites of an accepted file are never handed off again.
#[derive(Clone, Default)]
pub struct ProcessedSegments {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl ProcessedSegments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_processed(&self, filename: &str) -> bool {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).contains(filename)
    }

    /// Returns `false` when `filename` was already claimed.
    pub fn claim(&self, filename: &str) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(filename.to_string())
    }

    pub fn release(&self, filename: &str) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).remove(filename);
    }

    /// Forgets every name. Used when the stream goes idle, since the next
    /// encoder run starts numbering its files again.
    pub fn clear(&self) -> usize {
        let mut set = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let cleared = set.len();
        set.clear();
        cleared
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
