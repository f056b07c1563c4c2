use std::path::Path;

/// Content-Type for a segment or playlist, inferred from its extension.
pub fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("m3u8") => "application/vnd.apple.mpegurl",
        Some("m4s") => "video/iso.segment",
        Some("mp4") => "video/mp4",
        Some("ts") => "video/mp2t",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_extensions() {
        assert_eq!(content_type_for(Path::new("live/stream0001.ts")), "video/mp2t");
        assert_eq!(content_type_for(Path::new("playlist.m3u8")), "application/vnd.apple.mpegurl");
        assert_eq!(content_type_for(Path::new("noext")), "application/octet-stream");
    }
}
