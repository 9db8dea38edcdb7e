// src/storage/memory.rs

use crate::error::Result;
use crate::models::{StoreSlice, StoreStats, VideoRecord};
use crate::storage::{KeyState, KeyStateStore, SearchTerms, VideoStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock as SyncRwLock;
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;

/// In-memory implementation of key state storage
#[derive(Default)]
pub struct InMemoryKeyStore {
    key_states: Arc<RwLock<HashMap<String, KeyState>>>,
    counter: AtomicUsize,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyStateStore for InMemoryKeyStore {
    async fn initialize_keys(&self, fingerprints: &[String]) -> Result<()> {
        let now = Utc::now();
        let mut states_guard = self.key_states.write().await;
        for fingerprint in fingerprints {
            states_guard
                .entry(fingerprint.clone())
                .or_insert_with(|| KeyState::new(fingerprint.clone(), now));
        }
        Ok(())
    }

    async fn next_rotation_index(&self) -> Result<usize> {
        Ok(self.counter.fetch_add(1, Ordering::SeqCst))
    }

    async fn get_key_state(&self, fingerprint: &str) -> Result<Option<KeyState>> {
        trace!("InMemoryKeyStore::get_key_state: waiting for read lock");
        let states_guard = self.key_states.read().await;
        Ok(states_guard.get(fingerprint).cloned())
    }

    async fn get_all_key_states(&self) -> Result<HashMap<String, KeyState>> {
        let states_guard = self.key_states.read().await;
        Ok(states_guard.clone())
    }

    async fn save_key_state(&self, state: &KeyState) -> Result<()> {
        let mut states_guard = self.key_states.write().await;
        states_guard.insert(state.fingerprint.clone(), state.clone());
        Ok(())
    }
}

type PublishedKey = (Reverse<DateTime<Utc>>, String);

#[derive(Default)]
struct VideoIndex {
    by_id: HashMap<String, VideoRecord>,
    // Iterates newest first, ties by id ascending.
    by_published: BTreeSet<PublishedKey>,
}

/// In-memory video store with an id index and an ordered publish index.
#[derive(Default)]
pub struct InMemoryVideoStore {
    index: SyncRwLock<VideoIndex>,
}

impl InMemoryVideoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VideoStore for InMemoryVideoStore {
    async fn upsert(&self, record: VideoRecord) -> Result<bool> {
        let mut index = self.index.write();
        if index.by_id.contains_key(&record.video_id) {
            trace!(video_id = %record.video_id, "Duplicate video skipped");
            return Ok(false);
        }
        index
            .by_published
            .insert((Reverse(record.published_at), record.video_id.clone()));
        index.by_id.insert(record.video_id.clone(), record);
        Ok(true)
    }

    async fn page(&self, offset: usize, limit: usize) -> Result<StoreSlice> {
        let index = self.index.read();
        let items = index
            .by_published
            .iter()
            .skip(offset)
            .take(limit)
            .filter_map(|(_, id)| index.by_id.get(id).cloned())
            .collect();
        Ok(StoreSlice {
            items,
            total: index.by_id.len(),
        })
    }

    async fn search_partial(&self, text: &str, offset: usize, limit: usize) -> Result<StoreSlice> {
        let Some(terms) = SearchTerms::parse(text) else {
            return Ok(StoreSlice::empty());
        };
        let index = self.index.read();
        Ok(terms.select(index.by_id.values(), offset, limit))
    }

    async fn stats(&self) -> Result<StoreStats> {
        let index = self.index.read();
        Ok(StoreStats {
            total_videos: index.by_id.len(),
            latest_published: index.by_published.first().map(|(Reverse(at), _)| *at),
            oldest_published: index.by_published.last().map(|(Reverse(at), _)| *at),
        })
    }

    async fn get(&self, video_id: &str) -> Result<Option<VideoRecord>> {
        Ok(self.index.read().by_id.get(video_id).cloned())
    }
}
