// src/state.rs

use crate::cache::SearchCache;
use crate::config::AppConfig;
use crate::error::Result;
use crate::fetcher::{FetchPipeline, FetchScheduler};
use crate::key_pool::KeyPool;
use crate::query::QueryService;
use crate::storage::{InMemoryKeyStore, InMemoryVideoStore, KeyStateStore, VideoStore};
use crate::youtube::{VideoSearchApi, YouTubeClient};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

#[cfg(feature = "metrics")]
use metrics_exporter_prometheus::PrometheusHandle;

/// Shared application state handed to every axum handler.
pub struct AppState {
    pub config: AppConfig,
    pub key_pool: Arc<KeyPool>,
    pub cache: Arc<SearchCache>,
    pub store: Arc<dyn VideoStore>,
    pub pipeline: Arc<FetchPipeline>,
    pub scheduler: Arc<FetchScheduler>,
    pub queries: QueryService,
    pub start_time: Instant,
    #[cfg(feature = "metrics")]
    metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    /// Build the state from configuration, talking to the real upstream and,
    /// when `redis_url` is set, persisting into Redis.
    pub async fn new(config: &AppConfig) -> Result<Self> {
        info!("Creating shared AppState...");
        let (key_store, video_store) = build_stores(config).await?;
        let api: Arc<dyn VideoSearchApi> = Arc::new(YouTubeClient::new(&config.youtube)?);
        Self::from_parts(config.clone(), api, key_store, video_store).await
    }

    /// Wire the state around an arbitrary upstream and stores.
    pub async fn from_parts(
        config: AppConfig,
        api: Arc<dyn VideoSearchApi>,
        key_store: Arc<dyn KeyStateStore>,
        store: Arc<dyn VideoStore>,
    ) -> Result<Self> {
        let key_pool = Arc::new(KeyPool::from_config(&config, key_store).await?);
        let cache = Arc::new(SearchCache::from_config(
            &config.cache,
            config.fetcher.idle_query_skip_secs,
        ));
        // Covers search.list plus videos.list.
        let upstream_timeout = Duration::from_secs(config.youtube.request_timeout_secs.saturating_mul(2));
        let pipeline = Arc::new(FetchPipeline::new(
            key_pool.clone(),
            api,
            store.clone(),
            cache.clone(),
            upstream_timeout,
        ));
        let scheduler = Arc::new(FetchScheduler::new(pipeline.clone(), &config.fetcher));

        Ok(Self {
            queries: QueryService::new(store.clone()),
            config,
            key_pool,
            cache,
            store,
            pipeline,
            scheduler,
            start_time: Instant::now(),
            #[cfg(feature = "metrics")]
            metrics_handle: None,
        })
    }

    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Prometheus exposition text, if a recorder is installed.
    pub fn render_metrics(&self) -> Option<String> {
        #[cfg(feature = "metrics")]
        {
            self.metrics_handle.as_ref().map(PrometheusHandle::render)
        }
        #[cfg(not(feature = "metrics"))]
        {
            None
        }
    }
}

#[cfg(feature = "redis")]
async fn build_stores(config: &AppConfig) -> Result<(Arc<dyn KeyStateStore>, Arc<dyn VideoStore>)> {
    use crate::storage::{RedisKeyStore, RedisVideoStore};

    let Some(redis_url) = config.redis_url.as_deref() else {
        info!("Running without Redis persistence.");
        return Ok(in_memory_stores());
    };

    let pool = deadpool_redis::Config::from_url(redis_url)
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))?;
    // Verify connectivity at startup.
    drop(pool.get().await?);

    let prefix = config.redis_key_prefix.as_deref();
    let test_mode = config.server.test_mode;
    let key_store = RedisKeyStore::new(pool.clone(), prefix, test_mode).await?;
    let video_store = RedisVideoStore::new(pool, prefix, test_mode).await?;
    info!("Redis persistence is enabled.");
    Ok((Arc::new(key_store), Arc::new(video_store)))
}

#[cfg(not(feature = "redis"))]
async fn build_stores(config: &AppConfig) -> Result<(Arc<dyn KeyStateStore>, Arc<dyn VideoStore>)> {
    if config.redis_url.is_some() {
        tracing::warn!("redis_url is set but this build has no Redis support; using memory");
    }
    Ok(in_memory_stores())
}

fn in_memory_stores() -> (Arc<dyn KeyStateStore>, Arc<dyn VideoStore>) {
    (
        Arc::new(InMemoryKeyStore::new()),
        Arc::new(InMemoryVideoStore::new()),
    )
}
