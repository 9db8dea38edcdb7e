// src/handlers/stats.rs

use crate::error::Result;
use crate::models::StoreStats;
use crate::state::AppState;
use axum::{extract::State, Json};
use std::sync::Arc;

/// `GET /api/stats`
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Result<Json<StoreStats>> {
    Ok(Json(state.store.stats().await?))
}
