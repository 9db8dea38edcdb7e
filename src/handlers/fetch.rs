// src/handlers/fetch.rs

use crate::config::UPSTREAM_MAX_RESULTS;
use crate::error::{AppError, Result};
use crate::state::AppState;
use axum::{body::Bytes, extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

pub const DEFAULT_FETCH_QUERY: &str = "programming";

#[derive(Debug, Default, Deserialize)]
pub struct FetchRequest {
    pub query: Option<String>,
    pub max_results: Option<i64>,
}

impl FetchRequest {
    pub fn query(&self) -> &str {
        match self.query.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => q,
            _ => DEFAULT_FETCH_QUERY,
        }
    }

    pub fn max_results(&self) -> u32 {
        let upper = i64::from(UPSTREAM_MAX_RESULTS);
        // Clamped into 1..=50, so the cast is lossless.
        self.max_results.unwrap_or(upper).clamp(1, upper) as u32
    }
}

#[derive(Debug, Serialize)]
pub struct FetchResponse {
    pub message: String,
    pub query: String,
    pub total_fetched: usize,
    pub stored_count: usize,
}

/// `POST /api/videos/fetch`: run one fetch immediately, outside the timer.
///
/// An empty body means "all defaults"; malformed JSON is a 400.
#[instrument(skip_all)]
pub async fn fetch_videos(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<FetchResponse>> {
    let request: FetchRequest = if body.iter().all(u8::is_ascii_whitespace) {
        FetchRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::InvalidRequest {
            message: format!("malformed fetch request body: {e}"),
        })?
    };

    let query = request.query().to_string();
    let max_results = request.max_results();
    info!(query = %query, max_results, "Manual fetch requested");

    let outcome = state.pipeline.run(&query, max_results).await?;
    Ok(Json(FetchResponse {
        message: "Videos fetched successfully".to_string(),
        query: outcome.query,
        total_fetched: outcome.total_fetched,
        stored_count: outcome.stored_count,
    }))
}
