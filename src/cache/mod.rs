//! TTL + LRU cache for context selections
//!
//! Entries expire after their TTL and are evicted least-recently-accessed
//! first when the store is full. A background sweep removes expired entries
//! on a fixed interval so cleanup cost is not borne by lookups alone.
//! Fingerprint invalidation drops selections whose constituent files have
//! changed since they were cached.

use crate::optimizer::models::SelectedContext;
use crate::project::ProjectContext;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Cache entry with TTL and access tracking
#[derive(Debug, Clone)]
struct CacheEntry {
    selection: SelectedContext,
    /// Hash over the constituent files' (path, mtime) pairs at cache time
    fingerprint: String,
    created_at: Instant,
    last_accessed: Instant,
    access_count: u64,
    ttl: Duration,
}

impl CacheEntry {
    fn expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

#[derive(Debug, Default)]
struct StatsInner {
    hits: u64,
    misses: u64,
    evictions: u64,
    invalidations: u64,
    expirations: u64,
    lookups: u64,
    total_lookup_nanos: u128,
}

/// Snapshot of cache statistics, maintained incrementally
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub expirations: u64,
    pub entries: usize,
    pub avg_lookup_latency: Duration,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Bounded TTL+LRU store of prior selections
pub struct SelectionCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    stats: Mutex<StatsInner>,
    max_entries: usize,
    default_ttl: Duration,
}

impl SelectionCache {
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            stats: Mutex::new(StatsInner::default()),
            max_entries: max_entries.max(1),
            default_ttl,
        }
    }

    /// Store a selection. Evicts the least-recently-accessed entry first
    /// when the cache is full.
    pub fn set(
        &self,
        key: &str,
        selection: SelectedContext,
        fingerprint: String,
        ttl: Option<Duration>,
    ) {
        let now = Instant::now();
        let entry = CacheEntry {
            selection,
            fingerprint,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            ttl: ttl.unwrap_or(self.default_ttl),
        };

        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.max_entries && !entries.contains_key(key) {
            if let Some(lru_key) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone())
            {
                debug!("Evicting least-recently-used selection: {}", lru_key);
                entries.remove(&lru_key);
                self.stats.lock().unwrap().evictions += 1;
            }
        }
        entries.insert(key.to_string(), entry);
    }

    /// Look up a selection. An expired entry counts as a miss and is removed.
    pub fn get(&self, key: &str) -> Option<SelectedContext> {
        let start = Instant::now();
        let mut entries = self.entries.lock().unwrap();

        let result = match entries.get_mut(key) {
            Some(entry) if entry.expired() => {
                entries.remove(key);
                let mut stats = self.stats.lock().unwrap();
                stats.expirations += 1;
                None
            }
            Some(entry) => {
                entry.last_accessed = Instant::now();
                entry.access_count += 1;
                debug!("Cache hit for {} (access #{})", key, entry.access_count);
                Some(entry.selection.clone())
            }
            None => None,
        };
        drop(entries);

        let mut stats = self.stats.lock().unwrap();
        stats.lookups += 1;
        stats.total_lookup_nanos += start.elapsed().as_nanos();
        if result.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        result
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.lock().unwrap().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries whose constituent files changed in the given snapshot.
    /// Returns the number of entries removed.
    pub fn invalidate_by_project_change(&self, project: &ProjectContext) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| {
            let paths = entry.selection.file_paths();
            matches!(project.fingerprint_for(&paths), Some(fp) if fp == entry.fingerprint)
        });
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Invalidated {} stale selections after project change", removed);
            self.stats.lock().unwrap().invalidations += removed as u64;
        }
        removed
    }

    /// Remove expired entries. Called by the background sweep; safe to call
    /// directly as well.
    pub fn remove_expired(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| !entry.expired());
        let removed = before - entries.len();
        if removed > 0 {
            self.stats.lock().unwrap().expirations += removed as u64;
        }
        removed
    }

    /// Start the periodic cleanup sweep on the tokio runtime.
    pub fn spawn_cleanup(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = cache.remove_expired();
                if removed > 0 {
                    debug!("Cache sweep removed {} expired selections", removed);
                }
            }
        })
    }

    /// Statistics snapshot
    pub fn stats(&self) -> CacheStats {
        let stats = self.stats.lock().unwrap();
        let entries = self.entries.lock().unwrap().len();
        let avg_lookup_latency = if stats.lookups == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos((stats.total_lookup_nanos / stats.lookups as u128) as u64)
        };
        CacheStats {
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            invalidations: stats.invalidations,
            expirations: stats.expirations,
            entries,
            avg_lookup_latency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::models::{
        ContextConstraints, ContextFile, SelectedContext, SelectionStrategy, Task, TaskType,
    };
    use crate::project::testutil::{file, project};
    use crate::project::FileType;
    use chrono::Utc;

    fn selection(paths: &[&str]) -> SelectedContext {
        let files: Vec<ContextFile> = paths
            .iter()
            .map(|p| ContextFile::new(file(p, "go", FileType::Source, 100), 0.5, "test"))
            .collect();
        SelectedContext {
            task: Task::new(TaskType::Feature, "cache test"),
            total_tokens: 100 * files.len(),
            total_files: files.len(),
            selection_score: 0.5,
            strategy: SelectionStrategy::Relevance,
            constraints: ContextConstraints::relaxed(8000),
            created_at: Utc::now(),
            selection_duration: Duration::from_millis(1),
            files,
        }
    }

    #[test]
    fn test_set_then_get_round_trip() {
        let cache = SelectionCache::new(10, Duration::from_secs(60));
        cache.set("k", selection(&["a.go"]), "fp".to_string(), None);

        let found = cache.get("k");
        assert!(found.is_some());
        assert_eq!(found.unwrap().total_files, 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_expired_entry_is_a_miss_and_removed() {
        let cache = SelectionCache::new(10, Duration::from_millis(30));
        cache.set("k", selection(&["a.go"]), "fp".to_string(), None);
        assert!(cache.get("k").is_some());

        std::thread::sleep(Duration::from_millis(60));
        assert!(cache.get("k").is_none());
        assert_eq!(cache.len(), 0);

        let stats = cache.stats();
        assert_eq!(stats.expirations, 1);
    }

    #[test]
    fn test_overflow_evicts_before_insert() {
        let cache = SelectionCache::new(1, Duration::from_secs(60));
        cache.set("a", selection(&["a.go"]), "fp".to_string(), None);
        cache.set("b", selection(&["b.go"]), "fp".to_string(), None);

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_lru_eviction_prefers_stale_entry() {
        let cache = SelectionCache::new(2, Duration::from_secs(60));
        cache.set("a", selection(&["a.go"]), "fp".to_string(), None);
        std::thread::sleep(Duration::from_millis(5));
        cache.set("b", selection(&["b.go"]), "fp".to_string(), None);
        std::thread::sleep(Duration::from_millis(5));

        // Touch "a" so "b" becomes least recently accessed
        assert!(cache.get("a").is_some());
        cache.set("c", selection(&["c.go"]), "fp".to_string(), None);

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_delete_and_clear() {
        let cache = SelectionCache::new(10, Duration::from_secs(60));
        cache.set("a", selection(&["a.go"]), "fp".to_string(), None);
        cache.set("b", selection(&["b.go"]), "fp".to_string(), None);

        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidation_on_project_change() {
        let mut p = project(vec![
            file("a.go", "go", FileType::Source, 100),
            file("b.go", "go", FileType::Source, 100),
        ]);
        let cache = SelectionCache::new(10, Duration::from_secs(60));

        let sel_a = selection(&["a.go"]);
        let fp_a = p.fingerprint_for(&sel_a.file_paths()).unwrap();
        cache.set("a", sel_a, fp_a, None);

        let sel_b = selection(&["b.go"]);
        let fp_b = p.fingerprint_for(&sel_b.file_paths()).unwrap();
        cache.set("b", sel_b, fp_b, None);

        // Touch b.go; only the selection built on it should drop
        p.files[1].last_modified = Utc::now();
        let removed = cache.invalidate_by_project_change(&p);

        assert_eq!(removed, 1);
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn test_invalidation_drops_entry_for_deleted_file() {
        let p = project(vec![file("a.go", "go", FileType::Source, 100)]);
        let cache = SelectionCache::new(10, Duration::from_secs(60));
        cache.set("gone", selection(&["removed.go"]), "old-fp".to_string(), None);

        assert_eq!(cache.invalidate_by_project_change(&p), 1);
    }

    #[tokio::test]
    async fn test_background_sweep_removes_expired() {
        let cache = Arc::new(SelectionCache::new(10, Duration::from_millis(20)));
        cache.set("k", selection(&["a.go"]), "fp".to_string(), None);

        let handle = cache.spawn_cleanup(Duration::from_millis(25));
        tokio::time::sleep(Duration::from_millis(120)).await;
        handle.abort();

        // Removed by the sweep, not by a lookup
        assert_eq!(cache.len(), 0);
        assert!(cache.stats().expirations >= 1);
    }

    #[test]
    fn test_stats_hit_ratio() {
        let cache = SelectionCache::new(10, Duration::from_secs(60));
        cache.set("k", selection(&["a.go"]), "fp".to_string(), None);
        cache.get("k");
        cache.get("absent");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_ratio() - 0.5).abs() < f64::EPSILON);
    }
}
