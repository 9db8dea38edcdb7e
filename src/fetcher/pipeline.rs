// src/fetcher/pipeline.rs

use crate::cache::SearchCache;
use crate::error::{AppError, Result};
use crate::key_pool::{KeyPool, DETAILS_COST, SEARCH_COST};
use crate::models::VideoRecord;
use crate::storage::VideoStore;
use crate::youtube::VideoSearchApi;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchOutcome {
    pub query: String,
    pub total_fetched: usize,
    pub stored_count: usize,
    #[serde(skip)]
    pub from_cache: bool,
}

/// Cache lookup, key rotation, upstream search and storage for one query.
pub struct FetchPipeline {
    pool: Arc<KeyPool>,
    api: Arc<dyn VideoSearchApi>,
    store: Arc<dyn VideoStore>,
    cache: Arc<SearchCache>,
    upstream_timeout: Duration,
}

impl FetchPipeline {
    pub fn new(
        pool: Arc<KeyPool>,
        api: Arc<dyn VideoSearchApi>,
        store: Arc<dyn VideoStore>,
        cache: Arc<SearchCache>,
        upstream_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            api,
            store,
            cache,
            upstream_timeout,
        }
    }

    pub fn pool(&self) -> &Arc<KeyPool> {
        &self.pool
    }

    pub fn cache(&self) -> &Arc<SearchCache> {
        &self.cache
    }

    /// Fetch `query` and store whatever is new.
    ///
    /// A quota rejection exhausts the key and retries with the next one, at
    /// most once per key in the pool. Transient failures are returned as is.
    #[instrument(skip(self), fields(attempts = tracing::field::Empty))]
    pub async fn run(&self, query: &str, max_results: u32) -> Result<FetchOutcome> {
        if let Some(cached) = self.cache.get(query).await {
            debug!(query, "Serving fetch from search cache");
            return Ok(FetchOutcome {
                query: query.to_string(),
                total_fetched: cached.records.len(),
                stored_count: 0,
                from_cache: true,
            });
        }

        let attempts = self.pool.len().max(1);
        tracing::Span::current().record("attempts", attempts);

        for attempt in 1..=attempts {
            let lease = self.pool.acquire_key().await?;
            let call = self.api.search(&lease, query, max_results);

            let result = match tokio::time::timeout(self.upstream_timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(AppError::RequestTimeout {
                    timeout_secs: self.upstream_timeout.as_secs(),
                }),
            };

            match result {
                Ok(videos) => {
                    let units = if videos.is_empty() {
                        SEARCH_COST
                    } else {
                        SEARCH_COST + DETAILS_COST
                    };
                    if let Err(e) = self.pool.record_usage(lease.fingerprint(), units).await {
                        warn!(error = %e, "Failed to record quota usage");
                    }

                    let now = Utc::now();
                    let records: Vec<VideoRecord> =
                        videos.into_iter().map(|v| v.into_record(now)).collect();
                    return self.store_records(query, records).await;
                }
                Err(e) if e.is_quota() => {
                    warn!(
                        query,
                        attempt,
                        key.fingerprint = %lease.fingerprint(),
                        "Quota exceeded, rotating to next key"
                    );
                    self.pool.report_quota_exceeded(lease.fingerprint()).await?;
                }
                Err(e) => {
                    warn!(query, error = %e, "Upstream search failed");
                    return Err(e);
                }
            }
        }

        Err(AppError::PoolExhausted)
    }

    async fn store_records(&self, query: &str, records: Vec<VideoRecord>) -> Result<FetchOutcome> {
        let total_fetched = records.len();
        let mut stored_count = 0;
        for record in &records {
            if self.store.upsert(record.clone()).await? {
                stored_count += 1;
            }
        }

        self.cache.put(query, records).await;
        self.cache.mark_processed(query, stored_count).await;
        crate::metrics::record_videos_stored(stored_count);

        info!(
            query,
            total_fetched,
            stored_count,
            duplicates = total_fetched - stored_count,
            "Fetch stored new videos"
        );
        Ok(FetchOutcome {
            query: query.to_string(),
            total_fetched,
            stored_count,
            from_cache: false,
        })
    }
}
