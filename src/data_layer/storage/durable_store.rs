use async_trait::async_trait;
use std::path::Path;

use crate::error::StorageError;

/// Durable object storage fronted by a CDN.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Uploads the file under `key` and returns its public URL.
    async fn put_segment(&self, path: &Path, key: &str) -> Result<String, StorageError>;

    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// `{prefix}/{session_id}/{filename}`, tolerating slashes around the prefix.
pub fn object_key(prefix: &str, session_id: &str, filename: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{}/{}", session_id, filename)
    } else {
        format!("{}/{}/{}", prefix, session_id, filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_session_scoped_keys() {
        assert_eq!(object_key("live/", "1700000000000", "stream0001.ts"), "live/1700000000000/stream0001.ts");
        assert_eq!(object_key("", "s1", "a.ts"), "s1/a.ts");
    }
}
