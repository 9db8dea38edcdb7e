// src/query.rs

//! Paged listing and text search over the video store.
//!
//! Parameters are never rejected: `per_page` is clamped into
//! `1..=MAX_PER_PAGE`, a missing or non-positive `page` becomes 1, and a page
//! past the end yields no items with accurate metadata.

use crate::error::Result;
use crate::models::{StoreSlice, VideoRecord};
use crate::storage::VideoStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_PER_PAGE: usize = 20;
pub const MAX_PER_PAGE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub per_page: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl PageRequest {
    pub fn new(page: i64, per_page: i64) -> Self {
        let page = if page <= 0 {
            1
        } else {
            usize::try_from(page).unwrap_or(usize::MAX)
        };
        let per_page = per_page.clamp(1, MAX_PER_PAGE as i64) as usize;
        Self { page, per_page }
    }

    /// Lenient parsing of raw query-string values.
    pub fn from_params(page: Option<&str>, per_page: Option<&str>) -> Self {
        let page = page.and_then(|p| p.trim().parse::<i64>().ok()).unwrap_or(1);
        let per_page = per_page
            .and_then(|p| p.trim().parse::<i64>().ok())
            .unwrap_or(DEFAULT_PER_PAGE as i64);
        Self::new(page, per_page)
    }

    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationMeta {
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub pages: usize,
    pub has_next: bool,
    pub has_prev: bool,
    pub next_page: Option<usize>,
    pub prev_page: Option<usize>,
}

impl PaginationMeta {
    pub fn new(request: PageRequest, total: usize) -> Self {
        let PageRequest { page, per_page } = request;
        let pages = total.div_ceil(per_page);
        let has_next = page < pages;
        let has_prev = page > 1;
        Self {
            page,
            per_page,
            total,
            pages,
            has_next,
            has_prev,
            next_page: has_next.then(|| page + 1),
            prev_page: has_prev.then(|| page - 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoPage {
    pub items: Vec<VideoRecord>,
    pub pagination: PaginationMeta,
}

impl VideoPage {
    fn from_slice(slice: StoreSlice, request: PageRequest) -> Self {
        Self {
            pagination: PaginationMeta::new(request, slice.total),
            items: slice.items,
        }
    }
}

/// Read-only view over the store used by the HTTP handlers.
#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn VideoStore>,
}

impl QueryService {
    pub fn new(store: Arc<dyn VideoStore>) -> Self {
        Self { store }
    }

    pub async fn list_videos(&self, request: PageRequest) -> Result<VideoPage> {
        let slice = self.store.page(request.offset(), request.per_page).await?;
        debug!(page = request.page, per_page = request.per_page, total = slice.total, "Listed videos");
        Ok(VideoPage::from_slice(slice, request))
    }

    /// Blank `text` returns an empty page rather than an error.
    pub async fn search_videos(&self, text: &str, request: PageRequest) -> Result<VideoPage> {
        let slice = self
            .store
            .search_partial(text, request.offset(), request.per_page)
            .await?;
        debug!(query = text, total = slice.total, "Searched videos");
        Ok(VideoPage::from_slice(slice, request))
    }
}
