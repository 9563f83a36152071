//! Positional comments: records anchored to a word index in the narration
//! text, persisted through the key-value store.
//!
//! The list is loaded lazily on the first read and flushed to storage on
//! every mutation. A failed flush logs a warning and keeps the in-memory
//! list authoritative — persistence must never block the voice flow.

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::storage::Storage;

const STORE_KEY: &str = "comments";

/// Sentinel assignment id for pages outside the assignment URL pattern.
pub const UNKNOWN_ASSIGNMENT: &str = "unknown";

/// A saved voice comment, immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRecord {
    /// Creation timestamp in milliseconds, monotonic within a process.
    pub id: i64,
    pub text: String,
    /// Word index in the narration text the comment is anchored to.
    pub position_words: usize,
    pub assignment_id: String,
    pub file_name: String,
    pub timestamp_label: String,
}

/// Parse the assignment id out of a page URL matching `assignment/<digits>`,
/// falling back to the `"unknown"` sentinel.
pub fn assignment_id_from_url(url: &str) -> String {
    if let Some(idx) = url.find("assignment/") {
        let digits: String = url[idx + "assignment/".len()..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if !digits.is_empty() {
            return digits;
        }
    }
    UNKNOWN_ASSIGNMENT.to_string()
}

/// Ordered comment list with flush-on-mutation persistence.
pub struct CommentStore {
    storage: Storage,
    loaded: Option<Vec<CommentRecord>>,
    last_id: i64,
}

impl CommentStore {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            loaded: None,
            last_id: 0,
        }
    }

    /// Append a new comment and flush. Returns the created record.
    pub fn add(
        &mut self,
        text: &str,
        position_words: usize,
        assignment_id: &str,
        file_name: &str,
    ) -> CommentRecord {
        self.ensure_loaded();
        let record = CommentRecord {
            id: self.next_id(),
            text: text.to_string(),
            position_words,
            assignment_id: assignment_id.to_string(),
            file_name: file_name.to_string(),
            timestamp_label: Local::now().format("%Y-%m-%d %H:%M").to_string(),
        };
        self.loaded.as_mut().unwrap().push(record.clone());
        self.flush();
        info!(id = record.id, position = position_words, "Comment saved");
        record
    }

    /// Delete a comment by id. Returns whether anything was removed.
    pub fn delete(&mut self, id: i64) -> bool {
        self.ensure_loaded();
        let list = self.loaded.as_mut().unwrap();
        let before = list.len();
        list.retain(|c| c.id != id);
        let removed = list.len() != before;
        if removed {
            self.flush();
        }
        removed
    }

    /// Remove every comment and flush.
    pub fn clear(&mut self) {
        self.ensure_loaded();
        self.loaded.as_mut().unwrap().clear();
        self.flush();
    }

    /// All comments in save order.
    pub fn all(&mut self) -> &[CommentRecord] {
        self.ensure_loaded();
        self.loaded.as_deref().unwrap()
    }

    /// Comments scoped to one assignment, in save order.
    pub fn for_assignment(&mut self, assignment_id: &str) -> Vec<CommentRecord> {
        self.ensure_loaded();
        self.loaded
            .as_ref()
            .unwrap()
            .iter()
            .filter(|c| c.assignment_id == assignment_id)
            .cloned()
            .collect()
    }

    fn ensure_loaded(&mut self) {
        if self.loaded.is_some() {
            return;
        }
        let list: Vec<CommentRecord> = self.storage.get(STORE_KEY).unwrap_or_default();
        self.last_id = list.iter().map(|c| c.id).max().unwrap_or(0);
        self.loaded = Some(list);
    }

    fn flush(&self) {
        if let Some(list) = &self.loaded {
            if let Err(e) = self.storage.set(STORE_KEY, list) {
                warn!("Failed to persist comments: {}", e);
            }
        }
    }

    /// Millisecond timestamp, bumped past the previous id when two saves
    /// land in the same millisecond.
    fn next_id(&mut self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        self.last_id = if now > self.last_id { now } else { self.last_id + 1 };
        self.last_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, CommentStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CommentStore::new(Storage::new(dir.path()));
        (dir, store)
    }

    #[test]
    fn assignment_id_parses_digits() {
        assert_eq!(
            assignment_id_from_url("https://lms.example/course/7/assignment/4821?tab=files"),
            "4821"
        );
        assert_eq!(
            assignment_id_from_url("https://lms.example/dashboard"),
            UNKNOWN_ASSIGNMENT
        );
        assert_eq!(
            assignment_id_from_url("https://lms.example/assignment/"),
            UNKNOWN_ASSIGNMENT
        );
    }

    #[test]
    fn saved_comments_reload_in_order_with_identical_fields() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());

        let mut store = CommentStore::new(storage.clone());
        let a = store.add("fix formatting", 5, "4821", "essay.pdf");
        let b = store.add("good intro", 12, "4821", "essay.pdf");
        let c = store.add("citation needed", 30, "99", "notes.pdf");

        // Fresh store instance forces a reload from disk.
        let mut reloaded = CommentStore::new(storage);
        assert_eq!(reloaded.all(), &[a, b, c]);
    }

    #[test]
    fn ids_are_monotonic_within_a_process() {
        let (_dir, mut store) = store();
        let a = store.add("one", 0, "1", "f");
        let b = store.add("two", 0, "1", "f");
        let c = store.add("three", 0, "1", "f");
        assert!(a.id < b.id);
        assert!(b.id < c.id);
    }

    #[test]
    fn delete_and_clear_persist() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());

        let mut store = CommentStore::new(storage.clone());
        let a = store.add("one", 0, "1", "f");
        store.add("two", 0, "1", "f");
        assert!(store.delete(a.id));
        assert!(!store.delete(a.id));

        let mut reloaded = CommentStore::new(storage.clone());
        assert_eq!(reloaded.all().len(), 1);

        store.clear();
        let mut reloaded = CommentStore::new(storage);
        assert!(reloaded.all().is_empty());
    }

    #[test]
    fn for_assignment_filters() {
        let (_dir, mut store) = store();
        store.add("one", 0, "1", "f");
        store.add("two", 0, "2", "f");
        store.add("three", 0, "1", "f");
        let scoped = store.for_assignment("1");
        assert_eq!(scoped.len(), 2);
        assert!(scoped.iter().all(|c| c.assignment_id == "1"));
    }
}
