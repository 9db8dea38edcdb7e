// src/metrics.rs

//! Prometheus counters. Every recorder function compiles to nothing when the
//! `metrics` feature is off.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};
#[cfg(feature = "metrics")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::sync::Arc;

#[cfg(feature = "metrics")]
pub fn initialize_metrics() -> crate::error::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| crate::error::AppError::internal(format!("failed to install Prometheus recorder: {e}")))
}

pub fn record_tick(outcome: &'static str) {
    #[cfg(feature = "metrics")]
    counter!("fetch_ticks_total", "outcome" => outcome).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = outcome;
}

pub fn record_videos_stored(count: usize) {
    #[cfg(feature = "metrics")]
    counter!("videos_stored_total").increment(count as u64);
    #[cfg(not(feature = "metrics"))]
    let _ = count;
}

pub fn record_quota_exhaustion(reason: &'static str) {
    #[cfg(feature = "metrics")]
    counter!("api_key_exhaustions_total", "reason" => reason).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = reason;
}

pub fn record_cache_lookup(hit: bool) {
    #[cfg(feature = "metrics")]
    {
        let result = if hit { "hit" } else { "miss" };
        counter!("search_cache_lookups_total", "result" => result).increment(1);
    }
    #[cfg(not(feature = "metrics"))]
    let _ = hit;
}

pub fn set_scheduler_paused(paused: bool) {
    #[cfg(feature = "metrics")]
    gauge!("fetch_scheduler_paused").set(if paused { 1.0 } else { 0.0 });
    #[cfg(not(feature = "metrics"))]
    let _ = paused;
}

/// `GET /metrics`. 404 when no recorder is installed.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.render_metrics() {
        Some(body) => (StatusCode::OK, body),
        None => (StatusCode::NOT_FOUND, "metrics are not enabled".to_string()),
    }
}
