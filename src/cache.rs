// src/cache.rs

use crate::config::CacheConfig;
use crate::models::VideoRecord;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Result of a previous upstream search for one query.
#[derive(Debug, Clone)]
pub struct CachedSearch {
    pub records: Vec<VideoRecord>,
    pub inserted_at: Instant,
    pub ttl: Duration,
}

impl CachedSearch {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() >= self.ttl
    }
}

#[derive(Debug, Clone, Copy)]
struct ProcessedMark {
    at: Instant,
    new_count: usize,
}

/// Lowercase, trim and collapse inner whitespace.
#[must_use]
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Short-lived cache of upstream search results keyed by normalized query.
#[derive(Debug)]
pub struct SearchCache {
    entries: RwLock<HashMap<String, CachedSearch>>,
    processed: RwLock<HashMap<String, ProcessedMark>>,
    ttl: Duration,
    max_size: usize,
    idle_skip: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SearchCache {
    #[must_use]
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            processed: RwLock::new(HashMap::new()),
            ttl,
            max_size: max_size.max(1),
            idle_skip: Duration::ZERO,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Skip queries whose last fetch stored nothing for `window`. Zero disables.
    #[must_use]
    pub fn with_idle_skip(mut self, window: Duration) -> Self {
        self.idle_skip = window;
        self
    }

    #[must_use]
    pub fn from_config(config: &CacheConfig, idle_query_skip_secs: u64) -> Self {
        Self::new(Duration::from_secs(config.ttl_secs), config.max_entries)
            .with_idle_skip(Duration::from_secs(idle_query_skip_secs))
    }

    /// Fresh entry for `query`. An expired entry is dropped on the way.
    pub async fn get(&self, query: &str) -> Option<CachedSearch> {
        let key = normalize_query(query);
        {
            let entries = self.entries.read().await;
            match entries.get(&key) {
                Some(cached) if !cached.is_expired() => {
                    debug!(cache_key = %key, "Cache hit");
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    crate::metrics::record_cache_lookup(true);
                    return Some(cached.clone());
                }
                Some(_) => {}
                None => {
                    self.record_miss();
                    return None;
                }
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(&key).is_some_and(CachedSearch::is_expired) {
            entries.remove(&key);
            debug!(cache_key = %key, "Cache entry expired");
        }
        drop(entries);
        self.record_miss();
        None
    }

    pub async fn put(&self, query: &str, records: Vec<VideoRecord>) {
        let key = normalize_query(query);
        let cached = CachedSearch {
            records,
            inserted_at: Instant::now(),
            ttl: self.ttl,
        };

        let mut entries = self.entries.write().await;
        if entries.len() >= self.max_size && !entries.contains_key(&key) {
            entries.retain(|_, v| !v.is_expired());

            if entries.len() >= self.max_size {
                let oldest_key = entries
                    .iter()
                    .min_by_key(|(_, v)| v.inserted_at)
                    .map(|(k, _)| k.clone());

                if let Some(key_to_remove) = oldest_key {
                    entries.remove(&key_to_remove);
                    debug!(removed_key = %key_to_remove, "Evicted oldest cache entry");
                }
            }
        }

        entries.insert(key.clone(), cached);
        drop(entries);
        debug!(cache_key = %key, ttl_seconds = self.ttl.as_secs(), "Cached search result");
    }

    /// Remember how many new records the last fetch of `query` stored.
    pub async fn mark_processed(&self, query: &str, new_count: usize) {
        if self.idle_skip.is_zero() {
            return;
        }
        let mark = ProcessedMark {
            at: Instant::now(),
            new_count,
        };
        self.processed
            .write()
            .await
            .insert(normalize_query(query), mark);
    }

    /// True when the last fetch of `query` was recent and stored nothing.
    pub async fn should_skip(&self, query: &str) -> bool {
        if self.idle_skip.is_zero() {
            return false;
        }
        let processed = self.processed.read().await;
        processed
            .get(&normalize_query(query))
            .is_some_and(|mark| mark.new_count == 0 && mark.at.elapsed() < self.idle_skip)
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        let total_entries = entries.len();
        let expired_entries = entries.values().filter(|v| v.is_expired()).count();
        drop(entries);

        CacheStats {
            total_entries,
            expired_entries,
            active_entries: total_entries - expired_entries,
            max_size: self.max_size,
            ttl_secs: self.ttl.as_secs(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Drop every entry and idle mark. Returns the number of entries removed.
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.write().await;
        let count = entries.len();
        entries.clear();
        drop(entries);
        self.processed.write().await.clear();
        info!(cleared_entries = count, "Search cache cleared");
        count
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_cache_lookup(false);
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
    pub max_size: usize,
    pub ttl_secs: u64,
    pub hits: u64,
    pub misses: u64,
}
