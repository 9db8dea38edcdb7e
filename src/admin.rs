// src/admin.rs

//! Operator endpoints mounted under `/admin`.

use crate::cache::CacheStats;
use crate::error::Result;
use crate::fetcher::SchedulerStatus;
use crate::key_pool::KeySnapshot;
use crate::state::AppState;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct AdminStatus {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub uptime_seconds: u64,
    pub scheduler: SchedulerStatus,
    pub keys: Vec<KeySnapshot>,
    pub next_key_reset: DateTime<Utc>,
    pub cache: CacheStats,
}

#[derive(Debug, Serialize)]
pub struct KeyResetResponse {
    pub message: String,
    pub keys: Vec<KeySnapshot>,
}

#[derive(Debug, Serialize)]
pub struct CacheClearResponse {
    pub message: String,
    pub cleared_entries: usize,
}

pub fn admin_routes() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/admin",
        Router::new()
            .route("/status", get(get_status))
            .route("/keys/reset", post(reset_keys))
            .route("/cache/clear", post(clear_cache)),
    )
}

/// Scheduler progress, per-key quota state and cache counters in one payload.
pub async fn get_status(State(state): State<Arc<AppState>>) -> Result<Json<AdminStatus>> {
    let keys = state.key_pool.snapshot().await?;
    let cache = state.cache.stats().await;

    Ok(Json(AdminStatus {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        scheduler: state.scheduler.status(),
        keys,
        next_key_reset: state.key_pool.next_reset_at(),
        cache,
    }))
}

/// Clears exhaustion and usage on every key ahead of the daily boundary.
pub async fn reset_keys(State(state): State<Arc<AppState>>) -> Result<Json<KeyResetResponse>> {
    state.key_pool.reset_all().await?;
    info!(keys = state.key_pool.len(), "Key states reset by operator");
    Ok(Json(KeyResetResponse {
        message: "All API keys reset".to_string(),
        keys: state.key_pool.snapshot().await?,
    }))
}

pub async fn clear_cache(State(state): State<Arc<AppState>>) -> Result<Json<CacheClearResponse>> {
    let cleared_entries = state.cache.clear().await;
    info!(cleared_entries, "Search cache cleared by operator");
    Ok(Json(CacheClearResponse {
        message: "Search cache cleared".to_string(),
        cleared_entries,
    }))
}
