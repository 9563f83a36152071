//! Persistent key-value storage.
//!
//! One JSON file per key under the store directory, with atomic
//! temp-file-then-rename writes. Read failures are logged and treated as
//! "no data": a broken store must never block the primary action.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

/// File-backed key-value store.
#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!("Failed to create store dir {}: {}", dir.display(), e);
        }
        Self { dir }
    }

    /// Read and deserialize the value for `key`. Missing or unparseable
    /// entries are `None`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(val) => Some(val),
                Err(e) => {
                    warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {}", path.display(), e);
                }
                None
            }
        }
    }

    /// Serialize and persist the value for `key` atomically: write to a temp
    /// file in the same directory, then rename over the target.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let path = self.path_for(key);
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let tmp = dir.join(format!(".{}.{}.tmp", sanitize(key), std::process::id()));
        let json = serde_json::to_string(value)?;
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Remove the entry for `key`, ignoring missing files.
    pub fn remove(&self, key: &str) {
        let path = self.path_for(key);
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize(key)))
    }
}

/// Keys may contain separators ("cache:abc"); map them onto filename-safe
/// characters.
fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        name: String,
        count: u32,
    }

    #[test]
    fn set_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = Storage::new(dir.path());
        let entry = Entry {
            name: "report.pdf".to_string(),
            count: 3,
        };
        store.set("cache:abc", &entry).unwrap();
        assert_eq!(store.get::<Entry>("cache:abc"), Some(entry));
    }

    #[test]
    fn missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = Storage::new(dir.path());
        assert_eq!(store.get::<Entry>("nope"), None);
    }

    #[test]
    fn remove_deletes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = Storage::new(dir.path());
        store.set("k", &1u32).unwrap();
        store.remove("k");
        assert_eq!(store.get::<u32>("k"), None);
        // Removing again is harmless.
        store.remove("k");
    }

    #[test]
    fn corrupt_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = Storage::new(dir.path());
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        assert_eq!(store.get::<Entry>("bad"), None);
    }
}
