// src/handlers/mod.rs

//! Public JSON API handlers.

pub mod fetch;
pub mod stats;
pub mod videos;

pub use fetch::fetch_videos;
pub use stats::get_stats;
pub use videos::{list_videos, search_videos};

use axum::{response::IntoResponse, Json};
use chrono::Utc;
use serde_json::json;

/// Liveness probe.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
