use serde::Serialize;
use std::collections::VecDeque;
use thiserror::Error;

use super::chunk_types::ChunkDescriptor;
use crate::config::ManifestConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("chunk {0} has no delivery URL")]
    NoDeliveryUrl(String),
    #[error("chunk {0} is already in the window")]
    Duplicate(String),
    #[error("chunk {0} belongs to a finished session")]
    StaleSession(String),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ManifestStats {
    pub chunk_count: usize,
    pub total_size: u64,
    pub total_duration: f64,
    pub oldest_chunk: Option<String>,
    pub newest_chunk: Option<String>,
    pub media_sequence: u64,
    pub discontinuity_sequence: u64,
}

/// Bounded live window rendered as an open-ended HLS media playlist.
#[derive(Debug)]
pub struct ManifestStore {
    chunks: VecDeque<ChunkDescriptor>,
    max_chunks: usize,
    target_duration: u32,
    version: u32,
    session_id: Option<String>,
    discontinuity_sequence: u64,
}

impl ManifestStore {
    pub fn new(config: &ManifestConfig) -> Self {
        Self {
            chunks: VecDeque::with_capacity(config.max_chunks),
            max_chunks: config.max_chunks.max(1),
            target_duration: config.target_duration,
            version: config.version,
            session_id: None,
            discontinuity_sequence: 0,
        }
    }

    /// Switches the window to a new session. The window is cleared; a
    /// discontinuous start bumps the discontinuity counter.
    pub fn begin_session(&mut self, session_id: &str, discontinuous: bool) {
        self.chunks.clear();
        self.session_id = Some(session_id.to_string());
        if discontinuous {
            self.discontinuity_sequence += 1;
        }
    }

    /// Inserts `chunk` in sequence order and returns whatever overflowed the window.
    pub fn add_chunk(&mut self, chunk: ChunkDescriptor) -> Result<Vec<ChunkDescriptor>, ManifestError> {
        if chunk.http_url().is_none() {
            return Err(ManifestError::NoDeliveryUrl(chunk.filename));
        }
        match &self.session_id {
            Some(current) if *current != chunk.session_id => {
                return Err(ManifestError::StaleSession(chunk.filename));
            }
            None => self.session_id = Some(chunk.session_id.clone()),
            _ => {}
        }
        if self.chunks.iter().any(|c| c.same_chunk(&chunk)) {
            return Err(ManifestError::Duplicate(chunk.filename));
        }

        // Uploads finish out of order, so insert by sequence rather than append.
        let position = self.chunks.partition_point(|c| c.seq < chunk.seq);
        self.chunks.insert(position, chunk);

        let mut evicted = Vec::new();
        while self.chunks.len() > self.max_chunks {
            if let Some(removed) = self.chunks.pop_front() {
                tracing::debug!("Removed old chunk from manifest: {}", removed.filename);
                evicted.push(removed);
            }
        }
        Ok(evicted)
    }

    pub fn remove(&mut self, session_id: &str, filename: &str) -> Option<ChunkDescriptor> {
        let position = self
            .chunks
            .iter()
            .position(|c| c.session_id == session_id && c.filename == filename)?;
        self.chunks.remove(position)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn discontinuity_sequence(&self) -> u64 {
        self.discontinuity_sequence
    }

    pub fn snapshot(&self) -> Vec<ChunkDescriptor> {
        self.chunks.iter().cloned().collect()
    }

    pub fn render(&self) -> String {
        let mut playlist = String::new();

        playlist.push_str("#EXTM3U\n");
        playlist.push_str(&format!("#EXT-X-VERSION:{}\n", self.version));
        playlist.push_str(&format!("#EXT-X-TARGETDURATION:{}\n", self.target_duration));

        let Some(oldest) = self.chunks.front() else {
            playlist.push_str("#EXT-X-MEDIA-SEQUENCE:0\n");
            return playlist;
        };

        playlist.push_str(&format!("#EXT-X-MEDIA-SEQUENCE:{}\n", oldest.seq));
        if self.discontinuity_sequence > 0 {
            playlist.push_str(&format!(
                "#EXT-X-DISCONTINUITY-SEQUENCE:{}\n",
                self.discontinuity_sequence
            ));
        }

        for chunk in &self.chunks {
            if chunk.discontinuity {
                playlist.push_str("#EXT-X-DISCONTINUITY\n");
            }
            playlist.push_str(&format!("#EXTINF:{:.3},\n", self.target_duration as f64));
            // add_chunk guarantees a URL.
            playlist.push_str(chunk.http_url().unwrap_or_default());
            playlist.push('\n');
        }

        // Live: no #EXT-X-ENDLIST.
        playlist
    }

    pub fn stats(&self) -> ManifestStats {
        ManifestStats {
            chunk_count: self.chunks.len(),
            total_size: self.chunks.iter().map(|c| c.size).sum(),
            total_duration: self.chunks.len() as f64 * self.target_duration as f64,
            oldest_chunk: self.chunks.front().map(|c| c.filename.clone()),
            newest_chunk: self.chunks.back().map(|c| c.filename.clone()),
            media_sequence: self.chunks.front().map(|c| c.seq).unwrap_or(0),
            discontinuity_sequence: self.discontinuity_sequence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(max_chunks: usize) -> ManifestStore {
        ManifestStore::new(&ManifestConfig {
            max_chunks,
            target_duration: 6,
            version: 3,
        })
    }

    fn chunk(session: &str, seq: u64) -> ChunkDescriptor {
        let filename = format!("stream{:04}.ts", seq);
        let mut chunk = ChunkDescriptor::new(seq, filename.clone(), session);
        chunk.durable_url = Some(format!("https://cdn.example.com/live/{}/{}", session, filename));
        chunk
    }

    fn uri_lines(playlist: &str) -> Vec<&str> {
        playlist.lines().filter(|l| !l.starts_with('#')).collect()
    }

    #[test]
    fn empty_window_renders_minimal_header() {
        let playlist = store(3).render();
        assert_eq!(
            playlist,
            "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:0\n"
        );
        assert!(!playlist.contains("#EXT-X-ENDLIST"));
    }

    #[test]
    fn window_keeps_newest_chunks() {
        let mut manifest = store(3);
        manifest.begin_session("s1", false);
        let mut evicted = Vec::new();
        for seq in 1..=5 {
            evicted.extend(manifest.add_chunk(chunk("s1", seq)).unwrap());
        }

        let seqs: Vec<u64> = manifest.snapshot().iter().map(|c| c.seq).collect();
        assert_eq!(seqs, vec![3, 4, 5]);
        assert_eq!(evicted.iter().map(|c| c.seq).collect::<Vec<_>>(), vec![1, 2]);

        let playlist = manifest.render();
        assert!(playlist.contains("#EXT-X-MEDIA-SEQUENCE:3\n"));
        assert!(!playlist.contains("#EXT-X-DISCONTINUITY"));
        assert_eq!(uri_lines(&playlist).len(), 3);
        assert!(!playlist.contains("#EXT-X-ENDLIST"));
    }

    #[test]
    fn lists_min_of_announced_and_capacity_in_ascending_order() {
        for (announced, capacity) in [(2usize, 5usize), (5, 5), (9, 4)] {
            let mut manifest = store(capacity);
            // Reverse order exercises the ordered insert.
            for seq in (1..=announced as u64).rev() {
                let _ = manifest.add_chunk(chunk("s1", seq));
            }
            let seqs: Vec<u64> = manifest.snapshot().iter().map(|c| c.seq).collect();
            assert_eq!(seqs.len(), announced.min(capacity));
            assert!(seqs.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn rejects_chunks_without_url_duplicates_and_stale_sessions() {
        let mut manifest = store(3);
        manifest.begin_session("s2", false);

        let bare = ChunkDescriptor::new(1, "stream0001.ts", "s2");
        assert_eq!(
            manifest.add_chunk(bare),
            Err(ManifestError::NoDeliveryUrl("stream0001.ts".into()))
        );

        manifest.add_chunk(chunk("s2", 1)).unwrap();
        assert!(matches!(manifest.add_chunk(chunk("s2", 1)), Err(ManifestError::Duplicate(_))));
        assert!(matches!(manifest.add_chunk(chunk("s1", 9)), Err(ManifestError::StaleSession(_))));
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn origin_url_is_used_without_cdn() {
        let mut manifest = store(3);
        let mut origin = ChunkDescriptor::new(1, "stream0001.ts", "s1");
        origin.origin_url = Some("http://origin:3000/chunks/stream0001.ts".into());
        manifest.add_chunk(origin).unwrap();

        assert_eq!(uri_lines(&manifest.render()), vec!["http://origin:3000/chunks/stream0001.ts"]);
    }

    #[test]
    fn restart_marks_first_chunk_of_new_session() {
        let mut manifest = store(10);
        manifest.begin_session("A", false);
        manifest.add_chunk(chunk("A", 1)).unwrap();
        manifest.add_chunk(chunk("A", 2)).unwrap();

        manifest.begin_session("B", true);
        let mut first = chunk("B", 1);
        first.discontinuity = true;
        manifest.add_chunk(first).unwrap();
        manifest.add_chunk(chunk("B", 2)).unwrap();
        manifest.add_chunk(chunk("B", 3)).unwrap();

        let playlist = manifest.render();
        let lines: Vec<&str> = playlist.lines().collect();
        assert!(lines.contains(&"#EXT-X-DISCONTINUITY-SEQUENCE:1"));
        assert!(lines.contains(&"#EXT-X-MEDIA-SEQUENCE:1"));

        let marker = lines.iter().position(|l| *l == "#EXT-X-DISCONTINUITY").unwrap();
        assert_eq!(lines[marker + 1], "#EXTINF:6.000,");
        assert_eq!(lines[marker + 2], "https://cdn.example.com/live/B/stream0001.ts");
        assert_eq!(lines.iter().filter(|l| **l == "#EXT-X-DISCONTINUITY").count(), 1);
        assert_eq!(manifest.discontinuity_sequence(), 1);
    }

    #[test]
    fn counter_tracks_every_transition() {
        let mut manifest = store(10);
        manifest.begin_session("A", false);
        for (n, session) in ["B", "C", "D"].iter().enumerate() {
            manifest.begin_session(session, true);
            assert_eq!(manifest.discontinuity_sequence(), n as u64 + 1);
        }
    }

    #[test]
    fn stats_describe_window() {
        let mut manifest = store(3);
        let mut c = chunk("s1", 7);
        c.size = 1024;
        manifest.add_chunk(c).unwrap();

        let stats = manifest.stats();
        assert_eq!(stats.chunk_count, 1);
        assert_eq!(stats.total_size, 1024);
        assert_eq!(stats.media_sequence, 7);
        assert_eq!(stats.newest_chunk.as_deref(), Some("stream0007.ts"));
    }
}
