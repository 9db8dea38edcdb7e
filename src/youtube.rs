// src/youtube.rs

//! Client for the YouTube Data API v3.
//!
//! A search is two calls: `search.list` for ids and snippets, then
//! `videos.list` for duration and view count. A 403 whose reason is one of
//! [`QUOTA_REASONS`] becomes [`AppError::QuotaExceeded`]; every other failure
//! is reported as transient so the caller can simply skip the tick.

use crate::config::{YouTubeConfig, MAX_PUBLISHED_WITHIN_DAYS, UPSTREAM_MAX_RESULTS};
use crate::error::{AppError, Result};
use crate::key_pool::ApiKeyLease;
use crate::models::{Thumbnails, VideoRecord};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Error reasons that mean the key is out of quota.
pub const QUOTA_REASONS: [&str; 3] = ["quotaExceeded", "dailyLimitExceeded", "rateLimitExceeded"];

const USER_AGENT: &str = concat!("tube-feed/", env!("CARGO_PKG_VERSION"));

/// A search hit merged with its details, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawVideo {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub channel_id: String,
    pub channel_title: String,
    pub published_at: DateTime<Utc>,
    pub duration: Option<String>,
    pub view_count: u64,
    pub thumbnails: Thumbnails,
}

impl RawVideo {
    pub fn into_record(self, fetched_at: DateTime<Utc>) -> VideoRecord {
        VideoRecord {
            video_id: self.video_id,
            title: self.title,
            description: self.description,
            channel_id: self.channel_id,
            channel_title: self.channel_title,
            published_at: self.published_at,
            duration: self.duration,
            view_count: self.view_count,
            thumbnails: self.thumbnails,
            fetched_at,
        }
    }
}

/// Upstream video search.
#[async_trait]
pub trait VideoSearchApi: Send + Sync {
    /// Newest videos matching `query`, at most `max_results` of them.
    async fn search(&self, key: &ApiKeyLease, query: &str, max_results: u32) -> Result<Vec<RawVideo>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    published_at: DateTime<Utc>,
    #[serde(default)]
    channel_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    channel_title: String,
    #[serde(default)]
    thumbnails: SnippetThumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct SnippetThumbnails {
    default: Option<ThumbnailInfo>,
    medium: Option<ThumbnailInfo>,
    high: Option<ThumbnailInfo>,
}

#[derive(Debug, Deserialize)]
struct ThumbnailInfo {
    url: String,
}

#[derive(Debug, Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    content_details: Option<ContentDetails>,
    statistics: Option<Statistics>,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    // The API encodes counts as strings.
    view_count: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    reason: String,
}

struct VideoDetails {
    duration: Option<String>,
    view_count: u64,
}

pub struct YouTubeClient {
    client: Client,
    base_url: String,
    published_within: chrono::Duration,
}

impl YouTubeClient {
    pub fn new(config: &YouTubeConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::HttpClient {
                message: format!("Failed to create HTTP client: {e}"),
                status_code: None,
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            published_within: chrono::Duration::days(
                config.published_within_days.clamp(1, MAX_PUBLISHED_WITHIN_DAYS),
            ),
        })
    }

    async fn search_ids(
        &self,
        key: &ApiKeyLease,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<SearchItem>> {
        let published_after =
            (Utc::now() - self.published_within).to_rfc3339_opts(SecondsFormat::Secs, true);
        let max_results = max_results.clamp(1, UPSTREAM_MAX_RESULTS).to_string();

        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("part", "id,snippet"),
                ("q", query),
                ("type", "video"),
                ("order", "date"),
                ("publishedAfter", published_after.as_str()),
                ("maxResults", max_results.as_str()),
                ("key", key.expose()),
            ])
            .send()
            .await?;

        let body: SearchResponse = check_response(response, key).await?.json().await?;
        Ok(body.items)
    }

    async fn video_details(
        &self,
        key: &ApiKeyLease,
        ids: &[&str],
    ) -> Result<HashMap<String, VideoDetails>> {
        let response = self
            .client
            .get(format!("{}/videos", self.base_url))
            .query(&[
                ("part", "contentDetails,statistics"),
                ("id", ids.join(",").as_str()),
                ("key", key.expose()),
            ])
            .send()
            .await?;

        let body: VideosResponse = check_response(response, key).await?.json().await?;
        Ok(body
            .items
            .into_iter()
            .map(|item| {
                let details = VideoDetails {
                    duration: item.content_details.and_then(|c| c.duration),
                    view_count: item
                        .statistics
                        .and_then(|s| s.view_count)
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0),
                };
                (item.id, details)
            })
            .collect())
    }
}

#[async_trait]
impl VideoSearchApi for YouTubeClient {
    async fn search(&self, key: &ApiKeyLease, query: &str, max_results: u32) -> Result<Vec<RawVideo>> {
        let items = self.search_ids(key, query, max_results).await?;
        let hits: Vec<(String, Snippet)> = items
            .into_iter()
            .filter_map(|item| item.id.video_id.map(|id| (id, item.snippet)))
            .collect();

        if hits.is_empty() {
            debug!(query, "Upstream search returned no videos");
            return Ok(Vec::new());
        }

        let ids: Vec<&str> = hits.iter().map(|(id, _)| id.as_str()).collect();
        let mut details = self.video_details(key, &ids).await?;

        Ok(hits
            .into_iter()
            .map(|(video_id, snippet)| {
                let extra = details.remove(&video_id);
                RawVideo {
                    title: snippet.title,
                    description: snippet.description,
                    channel_id: snippet.channel_id,
                    channel_title: snippet.channel_title,
                    published_at: snippet.published_at,
                    duration: extra.as_ref().and_then(|d| d.duration.clone()),
                    view_count: extra.map_or(0, |d| d.view_count),
                    thumbnails: Thumbnails {
                        default: snippet.thumbnails.default.map(|t| t.url),
                        medium: snippet.thumbnails.medium.map(|t| t.url),
                        high: snippet.thumbnails.high.map(|t| t.url),
                    },
                    video_id,
                }
            })
            .collect())
    }
}

/// Pass successful responses through and classify the rest.
async fn check_response(response: Response, key: &ApiKeyLease) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let api_error = serde_json::from_str::<ErrorEnvelope>(&body).ok().map(|e| e.error);
    let reasons: Vec<&str> = api_error
        .as_ref()
        .map(|e| e.errors.iter().map(|d| d.reason.as_str()).collect())
        .unwrap_or_default();
    let message = api_error
        .as_ref()
        .map_or_else(|| status.to_string(), |e| e.message.clone());

    if status == StatusCode::FORBIDDEN && reasons.iter().any(|r| QUOTA_REASONS.contains(r)) {
        warn!(
            key.fingerprint = %key.fingerprint(),
            reasons = ?reasons,
            "Upstream rejected key for quota"
        );
        return Err(AppError::QuotaExceeded {
            key_id: key.fingerprint().to_string(),
        });
    }

    warn!(status = status.as_u16(), reasons = ?reasons, %message, "Upstream request failed");
    if status.is_server_error() {
        Err(AppError::transient(format!("upstream returned {status}: {message}")))
    } else {
        Err(AppError::HttpClient {
            message,
            status_code: Some(status.as_u16()),
        })
    }
}
