//! Durable feedback persistence
//!
//! One JSON document per feedback event, appended best-effort with no
//! retries. A write failure surfaces to the caller; the in-memory learning
//! that already happened is not rolled back.

use super::ContextFeedback;
use crate::error::{ContextError, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File-per-event feedback store
pub struct FeedbackStore {
    dir: PathBuf,
}

impl FeedbackStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| ContextError::Storage(format!("cannot create {}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist one record. Filenames order lexicographically by timestamp;
    /// the nanosecond suffix keeps same-second events distinct.
    pub fn append(&self, feedback: &ContextFeedback) -> Result<PathBuf> {
        let ts = feedback.created_at;
        let filename = format!(
            "feedback_{}_{}.json",
            ts.format("%Y%m%d_%H%M%S"),
            ts.timestamp_subsec_nanos()
        );
        let path = self.dir.join(filename);
        let json = serde_json::to_vec_pretty(feedback)?;
        fs::write(&path, json)
            .map_err(|e| ContextError::Storage(format!("cannot write {}: {e}", path.display())))?;
        Ok(path)
    }

    /// Load every parseable record created at or after `cutoff`, oldest
    /// first. Unreadable or malformed files are skipped.
    pub fn load_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<ContextFeedback>> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| ContextError::Storage(format!("cannot read {}: {e}", self.dir.display())))?;

        let mut records: Vec<ContextFeedback> = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with("feedback_") || !name.ends_with(".json") {
                continue;
            }
            let content = match fs::read_to_string(entry.path()) {
                Ok(content) => content,
                Err(e) => {
                    debug!("Skipping unreadable feedback file {}: {}", name, e);
                    continue;
                }
            };
            match serde_json::from_str::<ContextFeedback>(&content) {
                Ok(record) if record.created_at >= cutoff => records.push(record),
                Ok(_) => {}
                Err(e) => debug!("Skipping malformed feedback file {}: {}", name, e),
            }
        }

        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::testutil::feedback_with_quality;
    use chrono::Duration;

    #[test]
    fn test_append_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FeedbackStore::new(dir.path()).unwrap();

        let record = feedback_with_quality(0.7, true);
        let path = store.append(&record).unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("feedback_"));

        let loaded = store
            .load_since(Utc::now() - Duration::days(1))
            .unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, record.id);
        assert_eq!(loaded[0].version, 1);
    }

    #[test]
    fn test_load_since_filters_old_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = FeedbackStore::new(dir.path()).unwrap();

        let mut old = feedback_with_quality(0.4, false);
        old.created_at = Utc::now() - Duration::days(400);
        store.append(&old).unwrap();
        store.append(&feedback_with_quality(0.9, true)).unwrap();

        let loaded = store
            .load_since(Utc::now() - Duration::days(365))
            .unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].success);
    }

    #[test]
    fn test_malformed_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = FeedbackStore::new(dir.path()).unwrap();
        fs::write(dir.path().join("feedback_garbage.json"), b"not json").unwrap();
        store.append(&feedback_with_quality(0.5, true)).unwrap();

        let loaded = store
            .load_since(Utc::now() - Duration::days(1))
            .unwrap();
        assert_eq!(loaded.len(), 1);
    }
}
