// src/fetcher/scheduler.rs

//! Fixed-interval background cycle over the configured query list.
//!
//! Every tick takes the next query (wrapping around) and hands it to the
//! [`FetchPipeline`]. A failed tick is logged and forgotten. When the key pool
//! runs dry the cycle pauses until the earlier of the next quota reset and the
//! configured back-off; ticks during the pause never reach the upstream.

use crate::config::{FetcherConfig, MAX_EXHAUSTED_BACKOFF_SECS};
use crate::error::AppError;
use crate::fetcher::FetchPipeline;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    CacheHit,
    IdleQuery,
    NoQueries,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    Stored {
        query: String,
        fetched: usize,
        stored: usize,
    },
    Skipped {
        query: Option<String>,
        reason: SkipReason,
    },
    Failed {
        query: String,
        reason: String,
    },
}

impl TickOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Stored { .. } => "stored",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub ticks: u64,
    pub total_stored: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<TickOutcome>,
    pub paused_until: Option<DateTime<Utc>>,
    pub next_query: Option<String>,
}

#[derive(Default)]
struct StatusInner {
    ticks: u64,
    total_stored: u64,
    last_tick_at: Option<DateTime<Utc>>,
    last_outcome: Option<TickOutcome>,
    paused_until: Option<DateTime<Utc>>,
}

pub struct FetchScheduler {
    pipeline: Arc<FetchPipeline>,
    queries: Vec<String>,
    interval: Duration,
    max_results: u32,
    exhausted_backoff: chrono::Duration,
    cursor: AtomicUsize,
    status: Mutex<StatusInner>,
    running: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl FetchScheduler {
    pub fn new(pipeline: Arc<FetchPipeline>, config: &FetcherConfig) -> Self {
        let queries = config
            .queries
            .iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();
        // Unvalidated configs still must not overflow chrono.
        let backoff_secs = config.exhausted_backoff_secs.min(MAX_EXHAUSTED_BACKOFF_SECS) as i64;

        Self {
            pipeline,
            queries,
            interval: Duration::from_secs(config.interval_secs.max(1)),
            max_results: config.max_results,
            exhausted_backoff: chrono::Duration::seconds(backoff_secs),
            cursor: AtomicUsize::new(0),
            status: Mutex::new(StatusInner::default()),
            running: Mutex::new(None),
        }
    }

    /// Override the tick period. Mostly useful in tests.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Spawn the background cycle. Returns false if it is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut running = self.running.lock();
        if running.is_some() {
            return false;
        }

        let token = CancellationToken::new();
        let shutdown = token.clone();
        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                interval_secs = scheduler.interval.as_secs(),
                queries = scheduler.queries.len(),
                "Background fetcher started"
            );
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Background fetcher stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        scheduler.tick().await;
                    }
                }
            }
        });

        *running = Some((token, handle));
        true
    }

    /// Cancel the cycle and wait for the in-flight tick to finish.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        if let Some((token, handle)) = running {
            token.cancel();
            if let Err(e) = handle.await {
                error!(error = %e, "Background fetcher task ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    pub fn status(&self) -> SchedulerStatus {
        let inner = self.status.lock();
        SchedulerStatus {
            running: self.is_running(),
            ticks: inner.ticks,
            total_stored: inner.total_stored,
            last_tick_at: inner.last_tick_at,
            last_outcome: inner.last_outcome.clone(),
            paused_until: inner.paused_until,
            next_query: self.peek_query().map(str::to_string),
        }
    }

    /// Run one cycle step.
    pub async fn tick(&self) -> TickOutcome {
        let now = Utc::now();
        let outcome = match self.paused_until(now) {
            Some(until) => {
                debug!(paused_until = %until, "Fetcher paused, skipping tick");
                TickOutcome::Skipped {
                    query: None,
                    reason: SkipReason::Paused,
                }
            }
            None => self.fetch_next().await,
        };

        crate::metrics::record_tick(outcome.label());
        let mut inner = self.status.lock();
        inner.ticks += 1;
        inner.last_tick_at = Some(now);
        if let TickOutcome::Stored { stored, .. } = &outcome {
            inner.total_stored += *stored as u64;
        }
        inner.last_outcome = Some(outcome.clone());
        outcome
    }

    async fn fetch_next(&self) -> TickOutcome {
        let Some(query) = self.next_query() else {
            return TickOutcome::Skipped {
                query: None,
                reason: SkipReason::NoQueries,
            };
        };

        if self.pipeline.cache().should_skip(&query).await {
            debug!(query = %query, "Query stored nothing recently, skipping");
            return TickOutcome::Skipped {
                query: Some(query),
                reason: SkipReason::IdleQuery,
            };
        }

        match self.pipeline.run(&query, self.max_results).await {
            Ok(outcome) if outcome.from_cache => TickOutcome::Skipped {
                query: Some(query),
                reason: SkipReason::CacheHit,
            },
            Ok(outcome) => TickOutcome::Stored {
                query,
                fetched: outcome.total_fetched,
                stored: outcome.stored_count,
            },
            Err(AppError::PoolExhausted) => {
                let until = self.pause(Utc::now());
                warn!(query = %query, paused_until = %until, "All API keys exhausted, pausing fetcher");
                TickOutcome::Failed {
                    query,
                    reason: AppError::PoolExhausted.to_string(),
                }
            }
            Err(e) => {
                if e.is_transient() {
                    warn!(query = %query, error = %e, "Fetch tick skipped after transient failure");
                } else {
                    error!(query = %query, error = %e, "Fetch tick failed");
                }
                TickOutcome::Failed {
                    query,
                    reason: e.to_string(),
                }
            }
        }
    }

    fn next_query(&self) -> Option<String> {
        if self.queries.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.queries.len();
        Some(self.queries[index].clone())
    }

    fn peek_query(&self) -> Option<&str> {
        if self.queries.is_empty() {
            return None;
        }
        let index = self.cursor.load(Ordering::Relaxed) % self.queries.len();
        Some(self.queries[index].as_str())
    }

    /// Active pause deadline; an elapsed one is cleared.
    fn paused_until(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut inner = self.status.lock();
        match inner.paused_until {
            Some(until) if until > now => Some(until),
            Some(_) => {
                inner.paused_until = None;
                crate::metrics::set_scheduler_paused(false);
                info!("Fetcher pause elapsed, resuming");
                None
            }
            None => None,
        }
    }

    fn pause(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let until = (now + self.exhausted_backoff).min(self.pipeline.pool().next_reset_after(now));
        self.status.lock().paused_until = Some(until);
        crate::metrics::set_scheduler_paused(true);
        until
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SearchCache;
    use crate::fetcher::testing::{raw_video, StubApi};
    use crate::key_pool::KeyPool;
    use crate::storage::{InMemoryKeyStore, InMemoryVideoStore};

    async fn scheduler_with(
        api: Arc<StubApi>,
        queries: &[&str],
        cache_ttl: Duration,
        idle_skip: Duration,
    ) -> FetchScheduler {
        let pool = Arc::new(
            KeyPool::new(["key-a"], Default::default(), Arc::new(InMemoryKeyStore::new()))
                .await
                .unwrap(),
        );
        let cache = SearchCache::new(cache_ttl, 16).with_idle_skip(idle_skip);
        let pipeline = Arc::new(FetchPipeline::new(
            pool,
            api,
            Arc::new(InMemoryVideoStore::new()),
            Arc::new(cache),
            Duration::from_secs(1),
        ));
        let config = FetcherConfig {
            queries: queries.iter().map(|q| q.to_string()).collect(),
            ..Default::default()
        };
        FetchScheduler::new(pipeline, &config)
    }

    #[tokio::test]
    async fn test_ticks_cycle_through_queries() {
        let api = Arc::new(StubApi::returning(vec![raw_video("a", "Rust")]));
        let scheduler = scheduler_with(api.clone(), &["rust", "go"], Duration::from_secs(60), Duration::ZERO).await;

        let first = scheduler.tick().await;
        assert_eq!(
            first,
            TickOutcome::Stored {
                query: "rust".into(),
                fetched: 1,
                stored: 1
            }
        );
        let second = scheduler.tick().await;
        assert!(matches!(second, TickOutcome::Stored { ref query, stored: 0, .. } if query == "go"));

        // Back to the first query, still cached.
        let third = scheduler.tick().await;
        assert_eq!(
            third,
            TickOutcome::Skipped {
                query: Some("rust".into()),
                reason: SkipReason::CacheHit
            }
        );

        let status = scheduler.status();
        assert_eq!(status.ticks, 3);
        assert_eq!(status.total_stored, 1);
        assert_eq!(status.next_query.as_deref(), Some("go"));
        assert_eq!(api.last_max_results(), Some(25));
    }

    #[tokio::test]
    async fn test_failed_tick_keeps_cycle_alive() {
        let api = Arc::new(StubApi::failing());
        let scheduler = scheduler_with(api.clone(), &["rust"], Duration::from_secs(60), Duration::ZERO).await;

        assert!(matches!(scheduler.tick().await, TickOutcome::Failed { .. }));
        assert!(matches!(scheduler.tick().await, TickOutcome::Failed { .. }));
        assert_eq!(api.calls(), 2);
        assert!(scheduler.status().paused_until.is_none());
    }

    #[tokio::test]
    async fn test_exhausted_pool_pauses_without_calling_upstream() {
        let api = Arc::new(StubApi::returning(Vec::new()).quota_for_first(usize::MAX));
        let scheduler = scheduler_with(api.clone(), &["rust"], Duration::from_secs(60), Duration::ZERO).await;

        assert!(matches!(scheduler.tick().await, TickOutcome::Failed { .. }));
        assert_eq!(api.calls(), 1);

        let paused_until = scheduler.status().paused_until.unwrap();
        assert!(paused_until > Utc::now());
        assert!(paused_until <= Utc::now() + chrono::Duration::hours(1));

        let outcome = scheduler.tick().await;
        assert_eq!(
            outcome,
            TickOutcome::Skipped {
                query: None,
                reason: SkipReason::Paused
            }
        );
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn test_idle_queries_are_skipped() {
        let api = Arc::new(StubApi::returning(vec![raw_video("a", "Rust")]));
        let scheduler = scheduler_with(api.clone(), &["rust"], Duration::from_millis(30), Duration::from_secs(60)).await;

        assert!(matches!(scheduler.tick().await, TickOutcome::Stored { stored: 1, .. }));
        tokio::time::sleep(Duration::from_millis(40)).await;
        // Cache expired; the same record comes back and nothing new is stored.
        assert!(matches!(scheduler.tick().await, TickOutcome::Stored { stored: 0, .. }));
        assert_eq!(
            scheduler.tick().await,
            TickOutcome::Skipped {
                query: Some("rust".into()),
                reason: SkipReason::IdleQuery
            }
        );
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_query_list_reports_no_queries() {
        let api = Arc::new(StubApi::returning(vec![raw_video("a", "Rust")]));
        let scheduler = scheduler_with(api.clone(), &["", "  "], Duration::from_secs(60), Duration::ZERO).await;

        assert_eq!(
            scheduler.tick().await,
            TickOutcome::Skipped {
                query: None,
                reason: SkipReason::NoQueries
            }
        );
        assert_eq!(api.calls(), 0);
        assert!(scheduler.status().next_query.is_none());
    }

    #[tokio::test]
    async fn test_oversized_backoff_is_clamped() {
        let api = Arc::new(StubApi::returning(Vec::new()).quota_for_first(usize::MAX));
        let pool = Arc::new(
            KeyPool::new(["key-a"], Default::default(), Arc::new(InMemoryKeyStore::new()))
                .await
                .unwrap(),
        );
        let pipeline = Arc::new(FetchPipeline::new(
            pool,
            api,
            Arc::new(InMemoryVideoStore::new()),
            Arc::new(SearchCache::new(Duration::from_secs(60), 16)),
            Duration::from_secs(1),
        ));
        let config = FetcherConfig {
            queries: vec!["rust".to_string()],
            exhausted_backoff_secs: u64::MAX,
            ..Default::default()
        };
        let scheduler = FetchScheduler::new(pipeline, &config);

        assert!(matches!(scheduler.tick().await, TickOutcome::Failed { .. }));
        let paused_until = scheduler.status().paused_until.unwrap();
        assert!(paused_until <= Utc::now() + chrono::Duration::days(1));
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let api = Arc::new(StubApi::returning(Vec::new()));
        let scheduler = scheduler_with(api, &["rust"], Duration::from_secs(60), Duration::ZERO)
            .await
            .with_interval(Duration::from_millis(10));
        let scheduler = Arc::new(scheduler);

        assert!(scheduler.start());
        assert!(!scheduler.start());
        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.stop().await;

        assert!(!scheduler.is_running());
        let ticks = scheduler.status().ticks;
        assert!(ticks >= 1);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(scheduler.status().ticks, ticks);
    }
}
