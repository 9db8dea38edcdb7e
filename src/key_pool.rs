// src/key_pool.rs

//! Rotating pool of upstream API keys.
//!
//! Keys are handed out round-robin and skipped while exhausted. A key becomes
//! exhausted either when the upstream rejects it for quota reasons or when its
//! locally accounted usage reaches the soft limit. Exhaustion is cleared at the
//! daily reset boundary (checked lazily on every pool access) or by an explicit
//! [`KeyPool::reset_all`].
//!
//! Keys never leave the pool in plain text except through
//! [`ApiKeyLease::expose`]; logs and snapshots carry only the fingerprint.

use crate::config::{AppConfig, QuotaConfig};
use crate::core::KeySelector;
use crate::error::{AppError, Result};
use crate::storage::{KeyState, KeyStateStore};
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use secrecy::{ExposeSecret, Secret};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Quota units charged for one `search.list` call.
pub const SEARCH_COST: u32 = 100;
/// Quota units charged for one `videos.list` call.
pub const DETAILS_COST: u32 = 1;

const FINGERPRINT_LEN: usize = 12;

/// Stable, non-reversible identifier for a key.
pub fn fingerprint(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(FINGERPRINT_LEN);
    hex
}

/// Most recent reset boundary at or before `now`.
pub fn last_reset_boundary(now: DateTime<Utc>, reset_hour_utc: u32) -> DateTime<Utc> {
    let at = NaiveTime::from_hms_opt(reset_hour_utc, 0, 0).unwrap_or(NaiveTime::MIN);
    let today = Utc.from_utc_datetime(&now.date_naive().and_time(at));
    if today > now {
        today - Duration::days(1)
    } else {
        today
    }
}

/// A key checked out for a single upstream call.
#[derive(Debug, Clone)]
pub struct ApiKeyLease {
    fingerprint: String,
    secret: Secret<String>,
}

impl ApiKeyLease {
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }
}

/// Per-key view for the admin surface.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct KeySnapshot {
    pub fingerprint: String,
    pub exhausted: bool,
    pub exhausted_at: Option<DateTime<Utc>>,
    pub quota_used: u32,
}

impl From<KeyState> for KeySnapshot {
    fn from(state: KeyState) -> Self {
        Self {
            fingerprint: state.fingerprint,
            exhausted: state.exhausted,
            exhausted_at: state.exhausted_at,
            quota_used: state.quota_used,
        }
    }
}

struct PooledKey {
    fingerprint: String,
    secret: Secret<String>,
}

pub struct KeyPool {
    keys: Vec<PooledKey>,
    fingerprints: Vec<String>,
    store: Arc<dyn KeyStateStore>,
    selector: KeySelector,
    quota: QuotaConfig,
    // Serializes read-modify-write cycles on key state.
    mutation: Mutex<()>,
}

impl KeyPool {
    #[instrument(skip_all, name = "key_pool_init")]
    pub async fn new<I, S>(keys: I, quota: QuotaConfig, store: Arc<dyn KeyStateStore>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<PooledKey> = keys
            .into_iter()
            .map(Into::into)
            .map(|key: String| PooledKey {
                fingerprint: fingerprint(&key),
                secret: Secret::new(key),
            })
            .collect();
        let fingerprints: Vec<String> = keys.iter().map(|k| k.fingerprint.clone()).collect();

        store.initialize_keys(&fingerprints).await?;
        info!(
            keys = keys.len(),
            fingerprints = ?fingerprints,
            "Key pool initialized"
        );

        Ok(Self {
            keys,
            fingerprints,
            store,
            selector: KeySelector::with_round_robin(),
            quota,
            mutation: Mutex::new(()),
        })
    }

    pub async fn from_config(config: &AppConfig, store: Arc<dyn KeyStateStore>) -> Result<Self> {
        Self::new(config.api_keys(), config.quota.clone(), store).await
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Next usable key, or [`AppError::PoolExhausted`].
    #[instrument(skip(self), level = "debug")]
    pub async fn acquire_key(&self) -> Result<ApiKeyLease> {
        self.refresh_at(Utc::now()).await?;

        let position = self
            .selector
            .select_available_key(&self.fingerprints, self.store.clone())
            .await?;

        match position.and_then(|i| self.keys.get(i)) {
            Some(key) => Ok(ApiKeyLease {
                fingerprint: key.fingerprint.clone(),
                secret: key.secret.clone(),
            }),
            None => {
                warn!(keys = self.keys.len(), "No usable API key left in the pool");
                Err(AppError::PoolExhausted)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn report_quota_exceeded(&self, fingerprint: &str) -> Result<()> {
        let now = Utc::now();
        let _guard = self.mutation.lock().await;
        let mut state = self.load_state(fingerprint, now).await?;
        state.mark_exhausted(now);
        self.store.save_key_state(&state).await?;

        crate::metrics::record_quota_exhaustion("upstream");
        warn!(
            key.fingerprint = %fingerprint,
            next_reset = %self.next_reset_after(now),
            "API key exhausted by upstream quota"
        );
        Ok(())
    }

    pub async fn record_usage(&self, fingerprint: &str, units: u32) -> Result<()> {
        let now = Utc::now();
        let _guard = self.mutation.lock().await;
        let mut state = self.load_state(fingerprint, now).await?;
        let crossed = state.record_usage(units, self.quota.soft_limit_units, now);
        self.store.save_key_state(&state).await?;

        if crossed {
            crate::metrics::record_quota_exhaustion("soft_limit");
            warn!(
                key.fingerprint = %fingerprint,
                quota_used = state.quota_used,
                soft_limit = self.quota.soft_limit_units,
                "API key retired after reaching its soft quota limit"
            );
        } else {
            debug!(key.fingerprint = %fingerprint, quota_used = state.quota_used, "Quota usage recorded");
        }
        Ok(())
    }

    /// Clears exhaustion and usage on every key.
    pub async fn reset_all(&self) -> Result<()> {
        let now = Utc::now();
        let _guard = self.mutation.lock().await;
        for fingerprint in &self.fingerprints {
            self.store
                .save_key_state(&KeyState::new(fingerprint.clone(), now))
                .await?;
        }
        info!(keys = self.fingerprints.len(), "All API keys reset");
        Ok(())
    }

    /// Per-key state in configuration order.
    pub async fn snapshot(&self) -> Result<Vec<KeySnapshot>> {
        let now = Utc::now();
        self.refresh_at(now).await?;
        let mut states = self.store.get_all_key_states().await?;
        Ok(self
            .fingerprints
            .iter()
            .map(|fp| {
                states
                    .remove(fp)
                    .unwrap_or_else(|| KeyState::new(fp.clone(), now))
                    .into()
            })
            .collect())
    }

    pub fn next_reset_at(&self) -> DateTime<Utc> {
        self.next_reset_after(Utc::now())
    }

    pub fn next_reset_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        last_reset_boundary(now, self.quota.reset_hour_utc) + Duration::days(1)
    }

    /// Clear every state recorded before the last reset boundary. Returns how
    /// many keys were cleared.
    pub(crate) async fn refresh_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let boundary = last_reset_boundary(now, self.quota.reset_hour_utc);
        let _guard = self.mutation.lock().await;

        let mut cleared = 0;
        for state in self.store.get_all_key_states().await?.into_values() {
            if state.is_stale(boundary) {
                let mut fresh = state;
                fresh.roll_forward(boundary, now);
                self.store.save_key_state(&fresh).await?;
                cleared += 1;
            }
        }
        if cleared > 0 {
            info!(cleared, boundary = %boundary, "Daily quota reset applied");
        }
        Ok(cleared)
    }

    async fn load_state(&self, fingerprint: &str, now: DateTime<Utc>) -> Result<KeyState> {
        if !self.fingerprints.iter().any(|fp| fp == fingerprint) {
            return Err(AppError::validation(
                "fingerprint",
                format!("Unknown API key fingerprint '{fingerprint}'"),
            ));
        }
        let mut state = self
            .store
            .get_key_state(fingerprint)
            .await?
            .unwrap_or_else(|| KeyState::new(fingerprint.to_string(), now));
        // Changes always land in the current window.
        state.roll_forward(last_reset_boundary(now, self.quota.reset_hour_utc), now);
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryKeyStore;
    use rstest::rstest;

    async fn pool(keys: &[&str]) -> KeyPool {
        KeyPool::new(
            keys.iter().copied(),
            QuotaConfig::default(),
            Arc::new(InMemoryKeyStore::new()),
        )
        .await
        .unwrap()
    }

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_fingerprint_hides_key() {
        let fp = fingerprint("AIzaSyD-super-secret");
        assert_eq!(fp.len(), FINGERPRINT_LEN);
        assert!(!fp.contains("secret"));
        assert_eq!(fp, fingerprint("AIzaSyD-super-secret"));
        assert_ne!(fp, fingerprint("AIzaSyD-other"));
    }

    #[rstest]
    #[case("2024-05-01T09:30:00Z", 8, "2024-05-01T08:00:00Z")]
    #[case("2024-05-01T07:59:59Z", 8, "2024-04-30T08:00:00Z")]
    #[case("2024-05-01T08:00:00Z", 8, "2024-05-01T08:00:00Z")]
    #[case("2024-05-01T00:10:00Z", 0, "2024-05-01T00:00:00Z")]
    fn test_last_reset_boundary(#[case] now: &str, #[case] hour: u32, #[case] expected: &str) {
        assert_eq!(last_reset_boundary(at(now), hour), at(expected));
    }

    #[tokio::test]
    async fn test_quota_error_rotates_to_other_key() {
        let pool = pool(&["key-a", "key-b"]).await;

        let first = pool.acquire_key().await.unwrap();
        pool.report_quota_exceeded(first.fingerprint()).await.unwrap();

        let second = pool.acquire_key().await.unwrap();
        assert_ne!(first.fingerprint(), second.fingerprint());

        // Only the remaining key is served until it is exhausted too.
        let third = pool.acquire_key().await.unwrap();
        assert_eq!(third.fingerprint(), second.fingerprint());

        pool.report_quota_exceeded(second.fingerprint()).await.unwrap();
        assert!(matches!(pool.acquire_key().await, Err(AppError::PoolExhausted)));
    }

    #[tokio::test]
    async fn test_empty_pool_is_exhausted() {
        let pool = pool(&[]).await;
        assert!(pool.is_empty());
        assert!(matches!(pool.acquire_key().await, Err(AppError::PoolExhausted)));
    }

    #[tokio::test]
    async fn test_soft_limit_retires_key() {
        let pool = pool(&["only"]).await;
        let lease = pool.acquire_key().await.unwrap();

        for _ in 0..94 {
            pool.record_usage(lease.fingerprint(), SEARCH_COST).await.unwrap();
        }
        assert!(pool.acquire_key().await.is_ok());

        pool.record_usage(lease.fingerprint(), SEARCH_COST).await.unwrap();
        assert!(matches!(pool.acquire_key().await, Err(AppError::PoolExhausted)));

        let snapshot = pool.snapshot().await.unwrap();
        assert_eq!(snapshot[0].quota_used, 9_500);
        assert!(snapshot[0].exhausted);
    }

    #[tokio::test]
    async fn test_reset_all_restores_every_key() {
        let pool = pool(&["key-a", "key-b"]).await;
        for _ in 0..2 {
            let lease = pool.acquire_key().await.unwrap();
            pool.report_quota_exceeded(lease.fingerprint()).await.unwrap();
        }
        assert!(pool.acquire_key().await.is_err());

        pool.reset_all().await.unwrap();
        assert!(pool.acquire_key().await.is_ok());
        assert!(pool.snapshot().await.unwrap().iter().all(|k| !k.exhausted));
    }

    #[tokio::test]
    async fn test_exhaustion_clears_after_reset_boundary() {
        let pool = pool(&["key-a"]).await;
        let lease = pool.acquire_key().await.unwrap();
        pool.report_quota_exceeded(lease.fingerprint()).await.unwrap();

        assert_eq!(pool.refresh_at(Utc::now()).await.unwrap(), 0);
        assert!(pool.snapshot().await.unwrap()[0].exhausted);

        let tomorrow = pool.next_reset_at() + Duration::minutes(1);
        assert_eq!(pool.refresh_at(tomorrow).await.unwrap(), 1);
        assert!(pool.acquire_key().await.is_ok());
    }

    async fn pool_with_idle_key(key: &str) -> KeyPool {
        let store = Arc::new(InMemoryKeyStore::new());
        let pool = KeyPool::new([key], QuotaConfig::default(), store.clone())
            .await
            .unwrap();
        // Untouched since two days ago, so its window predates today's boundary.
        let idle = KeyState::new(fingerprint(key), Utc::now() - Duration::days(2));
        store.save_key_state(&idle).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_usage_on_idle_key_survives_next_acquire() {
        let pool = pool_with_idle_key("idle-key").await;
        let lease = pool.acquire_key().await.unwrap();

        pool.record_usage(lease.fingerprint(), SEARCH_COST + DETAILS_COST)
            .await
            .unwrap();
        assert!(pool.acquire_key().await.is_ok());

        let snapshot = pool.snapshot().await.unwrap();
        assert_eq!(snapshot[0].quota_used, 101);
    }

    #[tokio::test]
    async fn test_quota_rejection_on_idle_key_holds_until_boundary() {
        let pool = pool_with_idle_key("idle-key").await;
        let fp = fingerprint("idle-key");

        pool.record_usage(&fp, SEARCH_COST + DETAILS_COST).await.unwrap();
        pool.report_quota_exceeded(&fp).await.unwrap();

        assert!(matches!(pool.acquire_key().await, Err(AppError::PoolExhausted)));
        assert!(pool.snapshot().await.unwrap()[0].exhausted);
    }

    #[tokio::test]
    async fn test_snapshot_never_contains_secret() {
        let pool = pool(&["very-secret-key"]).await;
        let json = serde_json::to_string(&pool.snapshot().await.unwrap()).unwrap();
        assert!(!json.contains("very-secret-key"));
        assert!(json.contains(&fingerprint("very-secret-key")));
    }

    #[tokio::test]
    async fn test_unknown_fingerprint_is_rejected() {
        let pool = pool(&["key-a"]).await;
        assert!(pool.report_quota_exceeded("nope").await.is_err());
    }
}
