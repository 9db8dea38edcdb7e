// src/handlers/videos.rs

use crate::error::Result;
use crate::models::VideoRecord;
use crate::query::{PageRequest, PaginationMeta, VideoPage};
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

/// Raw strings so that malformed numbers fall back to defaults instead of a 400.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<String>,
    pub per_page: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub page: Option<String>,
    pub per_page: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VideoListResponse {
    pub videos: Vec<VideoRecord>,
    pub pagination: PaginationMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
}

impl VideoListResponse {
    fn new(page: VideoPage, search_query: Option<String>) -> Self {
        Self {
            videos: page.items,
            pagination: page.pagination,
            search_query,
        }
    }
}

/// `GET /api/videos`: newest first.
#[instrument(skip(state))]
pub async fn list_videos(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<VideoListResponse>> {
    let request = PageRequest::from_params(params.page.as_deref(), params.per_page.as_deref());
    let page = state.queries.list_videos(request).await?;
    Ok(Json(VideoListResponse::new(page, None)))
}

/// `GET /api/videos/search`: every token of `q` must appear in the title or
/// the description. A missing or blank `q` yields an empty page.
#[instrument(skip(state))]
pub async fn search_videos(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<VideoListResponse>> {
    let request = PageRequest::from_params(params.page.as_deref(), params.per_page.as_deref());
    let text = params.q.unwrap_or_default();
    let page = state.queries.search_videos(&text, request).await?;
    Ok(Json(VideoListResponse::new(page, Some(text))))
}
