// src/core/key_rotation.rs

use crate::error::Result;
use crate::storage::KeyStateStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, trace};

/// Strategy for selecting the next key
#[async_trait]
pub trait KeyRotationStrategy: Send + Sync {
    /// Returns the position in `fingerprints` of the key to use, or `None`
    /// when every candidate is exhausted.
    async fn select_key(
        &self,
        fingerprints: &[String],
        store: Arc<dyn KeyStateStore>,
    ) -> Result<Option<usize>>;
}

/// Round-robin key selection strategy
pub struct RoundRobinStrategy;

#[async_trait]
impl KeyRotationStrategy for RoundRobinStrategy {
    async fn select_key(
        &self,
        fingerprints: &[String],
        store: Arc<dyn KeyStateStore>,
    ) -> Result<Option<usize>> {
        if fingerprints.is_empty() {
            return Ok(None);
        }

        let start_index = store.next_rotation_index().await?;

        for i in 0..fingerprints.len() {
            let position = (start_index + i) % fingerprints.len();
            let fingerprint = &fingerprints[position];

            match store.get_key_state(fingerprint).await? {
                Some(state) if !state.is_available() => {
                    trace!(key.fingerprint = %fingerprint, "Skipping exhausted key");
                    continue;
                }
                // Missing state means the key has never been used.
                _ => {
                    debug!(
                        event = "key_selected",
                        key.fingerprint = %fingerprint,
                        rotation_method = "round_robin",
                        total_candidates = fingerprints.len(),
                        "API key selected"
                    );
                    return Ok(Some(position));
                }
            }
        }

        Ok(None)
    }
}

/// High-level key selector that coordinates key selection
pub struct KeySelector {
    strategy: Box<dyn KeyRotationStrategy>,
}

impl KeySelector {
    pub fn new(strategy: Box<dyn KeyRotationStrategy>) -> Self {
        Self { strategy }
    }

    pub fn with_round_robin() -> Self {
        Self::new(Box::new(RoundRobinStrategy))
    }

    pub async fn select_available_key(
        &self,
        fingerprints: &[String],
        store: Arc<dyn KeyStateStore>,
    ) -> Result<Option<usize>> {
        trace!("Selecting key from {} candidates", fingerprints.len());
        self.strategy.select_key(fingerprints, store).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryKeyStore, KeyState};
    use chrono::Utc;

    fn fingerprints() -> Vec<String> {
        vec!["k0".into(), "k1".into(), "k2".into()]
    }

    #[tokio::test]
    async fn test_round_robin_cycles() {
        let store: Arc<dyn KeyStateStore> = Arc::new(InMemoryKeyStore::new());
        store.initialize_keys(&fingerprints()).await.unwrap();
        let selector = KeySelector::with_round_robin();

        let mut picks = Vec::new();
        for _ in 0..4 {
            picks.push(
                selector
                    .select_available_key(&fingerprints(), store.clone())
                    .await
                    .unwrap()
                    .unwrap(),
            );
        }
        assert_eq!(picks, vec![0, 1, 2, 0]);
    }

    #[tokio::test]
    async fn test_skips_exhausted_and_reports_none_when_all_are() {
        let store: Arc<dyn KeyStateStore> = Arc::new(InMemoryKeyStore::new());
        store.initialize_keys(&fingerprints()).await.unwrap();
        let selector = KeySelector::with_round_robin();

        let mut state = KeyState::new("k0".into(), Utc::now());
        state.mark_exhausted(Utc::now());
        store.save_key_state(&state).await.unwrap();

        let pick = selector
            .select_available_key(&fingerprints(), store.clone())
            .await
            .unwrap();
        assert_eq!(pick, Some(1));

        for fp in ["k1", "k2"] {
            let mut state = KeyState::new(fp.into(), Utc::now());
            state.mark_exhausted(Utc::now());
            store.save_key_state(&state).await.unwrap();
        }
        let pick = selector
            .select_available_key(&fingerprints(), store.clone())
            .await
            .unwrap();
        assert_eq!(pick, None);
    }
}
