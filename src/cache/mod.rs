//! Bounded file cache: in-memory bytes plus persisted entries.
//!
//! Keyed by a file id derived from the URL path with the query string
//! stripped. Total size is capped (LRU by last access); evicting an entry
//! also drops its persisted copy, so the cap holds across restarts.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::storage::Storage;

const INDEX_KEY: &str = "cache-index";

/// A cached file held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedFile {
    pub file_id: String,
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub cached_at: DateTime<Utc>,
}

/// Persisted form: bytes travel as base64.
#[derive(Debug, Serialize, Deserialize)]
struct StoredFile {
    file_name: String,
    mime_type: String,
    data: String,
    cached_at: DateTime<Utc>,
}

/// Derive the cache key for a file URL: the path with query string and
/// fragment stripped.
pub fn file_id_from_url(url: &str) -> String {
    let no_fragment = url.split('#').next().unwrap_or(url);
    let no_query = no_fragment.split('?').next().unwrap_or(no_fragment);
    // Drop the scheme and host when present; the path identifies the file.
    match no_query.find("://").map(|i| i + 3) {
        Some(host_start) => match no_query[host_start..].find('/') {
            Some(path_start) => no_query[host_start + path_start..].to_string(),
            None => no_query.to_string(),
        },
        None => no_query.to_string(),
    }
}

/// LRU file cache bounded by total bytes.
pub struct FileCache {
    storage: Storage,
    limit_bytes: u64,
    entries: HashMap<String, CachedFile>,
    /// Access order, oldest first.
    order: Vec<String>,
    total_bytes: u64,
}

impl FileCache {
    pub fn new(storage: Storage, limit_bytes: u64) -> Self {
        Self {
            storage,
            limit_bytes,
            entries: HashMap::new(),
            order: Vec::new(),
            total_bytes: 0,
        }
    }

    pub fn contains(&self, file_id: &str) -> bool {
        self.entries.contains_key(file_id) || self.known_ids().contains(&file_id.to_string())
    }

    /// Look up a file, restoring it from storage on a memory miss. Marks the
    /// entry most recently used.
    pub fn get(&mut self, file_id: &str) -> Option<CachedFile> {
        if self.entries.contains_key(file_id) {
            self.touch(file_id);
            return self.entries.get(file_id).cloned();
        }
        let stored: StoredFile = self.storage.get(&entry_key(file_id))?;
        let bytes = match BASE64.decode(&stored.data) {
            Ok(b) => b,
            Err(e) => {
                warn!(file_id, "Corrupt cached bytes: {}", e);
                self.storage.remove(&entry_key(file_id));
                return None;
            }
        };
        debug!(file_id, bytes = bytes.len(), "Restored file from storage");
        let file = CachedFile {
            file_id: file_id.to_string(),
            file_name: stored.file_name,
            mime_type: stored.mime_type,
            bytes,
            cached_at: stored.cached_at,
        };
        self.insert(file.clone());
        Some(file)
    }

    /// Insert a file, persist it, and evict least-recently-used entries
    /// until the byte cap holds. A file larger than the cap is rejected.
    pub fn insert(&mut self, file: CachedFile) {
        let size = file.bytes.len() as u64;
        if size > self.limit_bytes {
            warn!(
                file_id = %file.file_id,
                size,
                limit = self.limit_bytes,
                "File exceeds cache cap, not caching"
            );
            return;
        }

        if let Some(old) = self.entries.remove(&file.file_id) {
            self.total_bytes -= old.bytes.len() as u64;
            self.order.retain(|id| id != &file.file_id);
        }

        while self.total_bytes + size > self.limit_bytes {
            if !self.evict_oldest() {
                break;
            }
        }

        let stored = StoredFile {
            file_name: file.file_name.clone(),
            mime_type: file.mime_type.clone(),
            data: BASE64.encode(&file.bytes),
            cached_at: file.cached_at,
        };
        if let Err(e) = self.storage.set(&entry_key(&file.file_id), &stored) {
            warn!(file_id = %file.file_id, "Failed to persist cached file: {}", e);
        }

        self.total_bytes += size;
        self.order.push(file.file_id.clone());
        self.entries.insert(file.file_id.clone(), file);
        self.persist_index();
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn touch(&mut self, file_id: &str) {
        self.order.retain(|id| id != file_id);
        self.order.push(file_id.to_string());
    }

    fn evict_oldest(&mut self) -> bool {
        let Some(oldest) = self.order.first().cloned() else {
            return false;
        };
        self.order.remove(0);
        if let Some(old) = self.entries.remove(&oldest) {
            self.total_bytes -= old.bytes.len() as u64;
        }
        self.storage.remove(&entry_key(&oldest));
        self.persist_index();
        info!(file_id = %oldest, "Evicted least-recently-used cached file");
        true
    }

    fn known_ids(&self) -> Vec<String> {
        self.storage.get(INDEX_KEY).unwrap_or_default()
    }

    fn persist_index(&self) {
        if let Err(e) = self.storage.set(INDEX_KEY, &self.order) {
            warn!("Failed to persist cache index: {}", e);
        }
    }
}

/// Storage key for a cache entry: file ids are URL paths, so hash them into
/// a filename-safe key.
fn entry_key(file_id: &str) -> String {
    let digest = Sha256::digest(file_id.as_bytes());
    format!("cache-{}", hex::encode(&digest[..16]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(id: &str, size: usize) -> CachedFile {
        CachedFile {
            file_id: id.to_string(),
            file_name: format!("{}.pdf", id),
            mime_type: "application/pdf".to_string(),
            bytes: vec![0xAB; size],
            cached_at: Utc::now(),
        }
    }

    #[test]
    fn file_id_strips_query_and_host() {
        assert_eq!(
            file_id_from_url("https://lms.example/files/42/essay.pdf?token=xyz#page=2"),
            "/files/42/essay.pdf"
        );
        assert_eq!(file_id_from_url("/files/42/essay.pdf"), "/files/42/essay.pdf");
    }

    #[test]
    fn second_request_hits_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = FileCache::new(Storage::new(dir.path()), 1024);
        cache.insert(file("a", 100));
        assert!(cache.contains("a"));
        let hit = cache.get("a").unwrap();
        assert_eq!(hit.bytes.len(), 100);
        // Re-inserting the same id keeps a single entry.
        cache.insert(file("a", 100));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn restores_from_storage_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());
        {
            let mut cache = FileCache::new(storage.clone(), 1024);
            cache.insert(file("a", 64));
        }
        let mut cache = FileCache::new(storage, 1024);
        assert!(cache.contains("a"));
        let restored = cache.get("a").unwrap();
        assert_eq!(restored.bytes, vec![0xAB; 64]);
    }

    #[test]
    fn lru_eviction_holds_byte_cap() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());
        let mut cache = FileCache::new(storage.clone(), 250);
        cache.insert(file("a", 100));
        cache.insert(file("b", 100));
        // Touch "a" so "b" becomes the eviction candidate.
        cache.get("a");
        cache.insert(file("c", 100));
        assert!(cache.total_bytes() <= 250);
        assert!(cache.entries.contains_key("a"));
        assert!(cache.entries.contains_key("c"));
        assert!(!cache.entries.contains_key("b"));
        // The evicted entry is gone from storage too.
        let mut fresh = FileCache::new(storage, 250);
        assert!(fresh.get("b").is_none());
    }

    #[test]
    fn oversized_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = FileCache::new(Storage::new(dir.path()), 50);
        cache.insert(file("big", 100));
        assert!(cache.is_empty());
    }
}
