// src/storage/traits.rs

use crate::error::Result;
use crate::models::{StoreSlice, StoreStats, VideoRecord};
use crate::storage::KeyState;
use async_trait::async_trait;
use std::collections::HashMap;

/// Persistence for per-key quota state and the rotation cursor.
#[async_trait]
pub trait KeyStateStore: Send + Sync {
    /// Create a fresh state for every fingerprint that has none yet.
    async fn initialize_keys(&self, fingerprints: &[String]) -> Result<()>;

    /// Advance the shared rotation cursor and return its previous value.
    async fn next_rotation_index(&self) -> Result<usize>;

    async fn get_key_state(&self, fingerprint: &str) -> Result<Option<KeyState>>;

    async fn get_all_key_states(&self) -> Result<HashMap<String, KeyState>>;

    async fn save_key_state(&self, state: &KeyState) -> Result<()>;
}

/// Deduplicated collection of video records.
#[async_trait]
pub trait VideoStore: Send + Sync {
    /// Insert unless the id is already stored. Returns whether a write happened.
    async fn upsert(&self, record: VideoRecord) -> Result<bool>;

    /// Records ordered newest first, ties by id ascending.
    async fn page(&self, offset: usize, limit: usize) -> Result<StoreSlice>;

    /// Token search over title and description.
    async fn search_partial(&self, text: &str, offset: usize, limit: usize) -> Result<StoreSlice>;

    async fn stats(&self) -> Result<StoreStats>;

    async fn get(&self, video_id: &str) -> Result<Option<VideoRecord>>;
}
