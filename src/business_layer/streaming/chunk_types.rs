use serde::{Deserialize, Serialize};

/// One announced chunk. This is both the bookkeeping record and the
/// `chunk` payload on the signaling wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkDescriptor {
    pub seq: u64,
    pub filename: String,
    #[serde(default)]
    pub size: u64,
    /// Capture time, unix milliseconds.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(rename = "r2", default, skip_serializing_if = "Option::is_none")]
    pub durable_url: Option<String>,
    #[serde(rename = "magnet", default, skip_serializing_if = "Option::is_none")]
    pub swarm_locator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_hash: Option<String>,
    #[serde(rename = "http", default, skip_serializing_if = "Option::is_none")]
    pub origin_url: Option<String>,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub discontinuity: bool,
    #[serde(default)]
    pub origin_only: bool,
}

impl ChunkDescriptor {
    pub fn new(seq: u64, filename: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            seq,
            filename: filename.into(),
            size: 0,
            timestamp: 0,
            durable_url: None,
            swarm_locator: None,
            info_hash: None,
            origin_url: None,
            session_id: session_id.into(),
            discontinuity: false,
            origin_only: false,
        }
    }

    /// URL a plain HTTP client should use: CDN first, origin second.
    pub fn http_url(&self) -> Option<&str> {
        self.durable_url.as_deref().or(self.origin_url.as_deref())
    }

    pub fn same_chunk(&self, other: &ChunkDescriptor) -> bool {
        self.session_id == other.session_id && self.filename == other.filename
    }

    /// Recomputes `origin_only` from the sources that ended up attached.
    pub fn settle_sources(&mut self) {
        self.origin_only = self.durable_url.is_none() && self.swarm_locator.is_none();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_durable_url() {
        let mut chunk = ChunkDescriptor::new(1, "stream0001.ts", "s1");
        assert_eq!(chunk.http_url(), None);

        chunk.origin_url = Some("http://origin/chunks/stream0001.ts".into());
        assert_eq!(chunk.http_url(), Some("http://origin/chunks/stream0001.ts"));

        chunk.durable_url = Some("https://cdn/live/s1/stream0001.ts".into());
        assert_eq!(chunk.http_url(), Some("https://cdn/live/s1/stream0001.ts"));
    }

    #[test]
    fn origin_only_without_cdn_or_swarm() {
        let mut chunk = ChunkDescriptor::new(1, "a.ts", "s1");
        chunk.origin_url = Some("http://origin/chunks/a.ts".into());
        chunk.settle_sources();
        assert!(chunk.origin_only);

        chunk.swarm_locator = Some("magnet:?xt=urn:btih:abc".into());
        chunk.settle_sources();
        assert!(!chunk.origin_only);
    }

    #[test]
    fn wire_names_match_viewer_protocol() {
        let json = r#"{"seq":4,"filename":"stream0004.ts","size":10,"timestamp":5,
            "r2":"https://cdn/x","magnet":"magnet:?x","infoHash":"ab","http":"http://o/x"}"#;
        let chunk: ChunkDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(chunk.durable_url.as_deref(), Some("https://cdn/x"));
        assert_eq!(chunk.swarm_locator.as_deref(), Some("magnet:?x"));
        assert_eq!(chunk.info_hash.as_deref(), Some("ab"));
        assert_eq!(chunk.session_id, "");

        let value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(value["r2"], "https://cdn/x");
        assert_eq!(value["sessionId"], "");
    }
}
