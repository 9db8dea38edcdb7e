// src/storage/redis.rs

use crate::error::{AppError, Result};
use crate::models::{StoreSlice, StoreStats, VideoRecord};
use crate::storage::{KeyState, KeyStateStore, SearchTerms, VideoStore};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use deadpool_redis::{Connection as RedisConnection, Pool};
use redis::AsyncCommands;
use std::collections::HashMap;
use tracing::{info, trace, warn};

const KEY_STATES_HASH: &str = "key_states";
const ROTATION_COUNTER_KEY: &str = "rotation_counter";
const VIDEOS_HASH: &str = "videos";
const PUBLISHED_INDEX: &str = "videos_by_published";
const SEARCH_BATCH: usize = 500;

pub const DEFAULT_KEY_PREFIX: &str = "tube_feed:";

// KEYS: records hash, published index. ARGV: id, record JSON, score.
// A duplicate still gets `ZADD NX` so a record missing from the index is
// picked up again.
const UPSERT_SCRIPT: &str = r#"
if redis.call('HSETNX', KEYS[1], ARGV[1], ARGV[2]) == 1 then
  redis.call('ZADD', KEYS[2], ARGV[3], ARGV[1])
  return 1
end
redis.call('ZADD', KEYS[2], 'NX', ARGV[3], ARGV[1])
return 0
"#;

fn prefixed(prefix: &str, key: &str) -> String {
    format!("{prefix}{key}")
}

/// Sorted-set score: negated publish time, so ascending ZRANGE yields newest
/// first and Redis breaks equal scores by member, i.e. by id ascending.
fn published_score(at: &DateTime<Utc>) -> f64 {
    -(at.timestamp() as f64)
}

fn score_to_time(score: f64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(-score as i64, 0).single()
}

async fn clear_for_test_mode(conn: &mut RedisConnection, keys: &[String]) -> Result<()> {
    info!("Test mode: clearing Redis state before start.");
    let _: () = conn.del(keys).await?;
    Ok(())
}

/// Redis implementation of key state storage
pub struct RedisKeyStore {
    pool: Pool,
    key_prefix: String,
}

impl RedisKeyStore {
    pub async fn new(pool: Pool, key_prefix: Option<&str>, test_mode: bool) -> Result<Self> {
        let key_prefix = key_prefix.unwrap_or(DEFAULT_KEY_PREFIX).to_string();
        if test_mode {
            let mut conn = pool.get().await?;
            let keys = [
                prefixed(&key_prefix, KEY_STATES_HASH),
                prefixed(&key_prefix, ROTATION_COUNTER_KEY),
            ];
            clear_for_test_mode(&mut conn, &keys).await?;
        }
        Ok(Self { pool, key_prefix })
    }

    fn prefix_key(&self, key: &str) -> String {
        prefixed(&self.key_prefix, key)
    }

    async fn get_connection(&self) -> Result<RedisConnection> {
        self.pool.get().await.map_err(Into::into)
    }

    fn parse_key_state(fingerprint: &str, raw: &str) -> Option<KeyState> {
        match serde_json::from_str(raw) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(fingerprint, error = %e, "Discarding unreadable key state");
                None
            }
        }
    }
}

#[async_trait]
impl KeyStateStore for RedisKeyStore {
    async fn initialize_keys(&self, fingerprints: &[String]) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let hash = self.prefix_key(KEY_STATES_HASH);
        let now = Utc::now();

        let mut pipe = redis::pipe();
        pipe.atomic();
        for fingerprint in fingerprints {
            let state = serde_json::to_string(&KeyState::new(fingerprint.clone(), now))?;
            pipe.hset_nx(&hash, fingerprint, state).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;

        info!(keys = fingerprints.len(), "Key states initialized in Redis");
        Ok(())
    }

    async fn next_rotation_index(&self) -> Result<usize> {
        let mut conn = self.get_connection().await?;
        let next: usize = conn.incr(self.prefix_key(ROTATION_COUNTER_KEY), 1).await?;
        Ok(next.saturating_sub(1))
    }

    async fn get_key_state(&self, fingerprint: &str) -> Result<Option<KeyState>> {
        trace!("RedisKeyStore::get_key_state: start for '{}'", fingerprint);
        let mut conn = self.get_connection().await?;
        let raw: Option<String> = conn.hget(self.prefix_key(KEY_STATES_HASH), fingerprint).await?;
        Ok(raw.and_then(|raw| Self::parse_key_state(fingerprint, &raw)))
    }

    async fn get_all_key_states(&self) -> Result<HashMap<String, KeyState>> {
        let mut conn = self.get_connection().await?;
        let raw: HashMap<String, String> = conn.hgetall(self.prefix_key(KEY_STATES_HASH)).await?;
        Ok(raw
            .into_iter()
            .filter_map(|(fp, json)| Self::parse_key_state(&fp, &json).map(|state| (fp, state)))
            .collect())
    }

    async fn save_key_state(&self, state: &KeyState) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let json = serde_json::to_string(state)?;
        let _: () = conn
            .hset(self.prefix_key(KEY_STATES_HASH), &state.fingerprint, json)
            .await?;
        Ok(())
    }
}

/// Redis video store: a hash of JSON records keyed by id plus a sorted set
/// ordered by publish time.
pub struct RedisVideoStore {
    pool: Pool,
    key_prefix: String,
    upsert_script: redis::Script,
}

impl RedisVideoStore {
    pub async fn new(pool: Pool, key_prefix: Option<&str>, test_mode: bool) -> Result<Self> {
        let key_prefix = key_prefix.unwrap_or(DEFAULT_KEY_PREFIX).to_string();
        if test_mode {
            let mut conn = pool.get().await?;
            let keys = [
                prefixed(&key_prefix, VIDEOS_HASH),
                prefixed(&key_prefix, PUBLISHED_INDEX),
            ];
            clear_for_test_mode(&mut conn, &keys).await?;
        }
        Ok(Self {
            pool,
            key_prefix,
            upsert_script: redis::Script::new(UPSERT_SCRIPT),
        })
    }

    fn prefix_key(&self, key: &str) -> String {
        prefixed(&self.key_prefix, key)
    }

    async fn get_connection(&self) -> Result<RedisConnection> {
        self.pool.get().await.map_err(Into::into)
    }

    async fn load_records(
        &self,
        conn: &mut RedisConnection,
        ids: &[String],
    ) -> Result<Vec<VideoRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let raw: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(self.prefix_key(VIDEOS_HASH))
            .arg(ids)
            .query_async(conn)
            .await?;

        raw.into_iter()
            .flatten()
            .map(|json| {
                serde_json::from_str(&json).map_err(|e| AppError::StoragePersistence {
                    message: format!("Corrupt video record: {e}"),
                })
            })
            .collect()
    }
}

#[async_trait]
impl VideoStore for RedisVideoStore {
    async fn upsert(&self, record: VideoRecord) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let json = serde_json::to_string(&record)?;

        // Record and index entry are written in one atomic step.
        let inserted: i64 = self
            .upsert_script
            .key(self.prefix_key(VIDEOS_HASH))
            .key(self.prefix_key(PUBLISHED_INDEX))
            .arg(&record.video_id)
            .arg(json)
            .arg(published_score(&record.published_at))
            .invoke_async(&mut conn)
            .await?;
        if inserted == 0 {
            trace!(video_id = %record.video_id, "Duplicate video skipped");
        }
        Ok(inserted == 1)
    }

    async fn page(&self, offset: usize, limit: usize) -> Result<StoreSlice> {
        let mut conn = self.get_connection().await?;
        let index = self.prefix_key(PUBLISHED_INDEX);
        let total: usize = conn.zcard(&index).await?;
        if limit == 0 || offset >= total {
            return Ok(StoreSlice {
                items: Vec::new(),
                total,
            });
        }

        let stop = (offset + limit - 1) as isize;
        let ids: Vec<String> = conn.zrange(&index, offset as isize, stop).await?;
        let items = self.load_records(&mut conn, &ids).await?;
        Ok(StoreSlice { items, total })
    }

    async fn search_partial(&self, text: &str, offset: usize, limit: usize) -> Result<StoreSlice> {
        let Some(terms) = SearchTerms::parse(text) else {
            return Ok(StoreSlice::empty());
        };

        let mut conn = self.get_connection().await?;
        let ids: Vec<String> = conn.zrange(self.prefix_key(PUBLISHED_INDEX), 0, -1).await?;

        let mut matching = Vec::new();
        for chunk in ids.chunks(SEARCH_BATCH) {
            let records = self.load_records(&mut conn, chunk).await?;
            matching.extend(records.into_iter().filter(|r| terms.matches(r)));
        }
        Ok(terms.select(matching.iter(), offset, limit))
    }

    async fn stats(&self) -> Result<StoreStats> {
        let mut conn = self.get_connection().await?;
        let index = self.prefix_key(PUBLISHED_INDEX);
        let total_videos: usize = conn.zcard(&index).await?;
        let newest: Vec<(String, f64)> = conn.zrange_withscores(&index, 0, 0).await?;
        let oldest: Vec<(String, f64)> = conn.zrange_withscores(&index, -1, -1).await?;

        Ok(StoreStats {
            total_videos,
            latest_published: newest.first().and_then(|(_, s)| score_to_time(*s)),
            oldest_published: oldest.first().and_then(|(_, s)| score_to_time(*s)),
        })
    }

    async fn get(&self, video_id: &str) -> Result<Option<VideoRecord>> {
        let mut conn = self.get_connection().await?;
        let raw: Option<String> = conn.hget(self.prefix_key(VIDEOS_HASH), video_id).await?;
        raw.map(|json| serde_json::from_str(&json).map_err(AppError::from))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::video;

    #[test]
    fn test_published_score_orders_newest_first() {
        let newer = video("a", "t", 10).published_at;
        let older = video("b", "t", 0).published_at;
        assert!(published_score(&newer) < published_score(&older));
        assert_eq!(score_to_time(published_score(&newer)), Some(newer));
    }

    /// Live Redis, only when `TEST_REDIS_URL` is set.
    async fn live_store(prefix: &str) -> Option<(Pool, RedisVideoStore)> {
        let url = std::env::var("TEST_REDIS_URL").ok()?;
        let pool = deadpool_redis::Config::from_url(url)
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .unwrap();
        let store = RedisVideoStore::new(pool.clone(), Some(prefix), true)
            .await
            .unwrap();
        Some((pool, store))
    }

    #[tokio::test]
    async fn test_upsert_writes_record_and_index_together() {
        let Some((_, store)) = live_store("tube_feed_test_upsert:").await else {
            return;
        };

        assert!(store.upsert(video("abc", "First", 0)).await.unwrap());
        assert!(!store.upsert(video("abc", "Second", 5)).await.unwrap());

        let page = store.page(0, 10).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].title, "First");
    }

    #[tokio::test]
    async fn test_duplicate_upsert_restores_missing_index_entry() {
        let Some((pool, store)) = live_store("tube_feed_test_repair:").await else {
            return;
        };

        // A record present in the hash but absent from the published index.
        let orphan = video("orphan", "Half written", 0);
        let mut conn = pool.get().await.unwrap();
        let _: () = conn
            .hset(
                store.prefix_key(VIDEOS_HASH),
                &orphan.video_id,
                serde_json::to_string(&orphan).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(store.page(0, 10).await.unwrap().total, 0);

        assert!(!store.upsert(orphan.clone()).await.unwrap());
        let page = store.page(0, 10).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0], orphan);
    }
}
