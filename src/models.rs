// src/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnails {
    pub default: Option<String>,
    pub medium: Option<String>,
    pub high: Option<String>,
}

/// A stored video. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub channel_id: String,
    pub channel_title: String,
    pub published_at: DateTime<Utc>,
    /// ISO-8601 duration exactly as the upstream reported it.
    pub duration: Option<String>,
    pub view_count: u64,
    pub thumbnails: Thumbnails,
    pub fetched_at: DateTime<Utc>,
}

/// One window of an ordered listing plus the size of the whole listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreSlice {
    pub items: Vec<VideoRecord>,
    pub total: usize,
}

impl StoreSlice {
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_videos: usize,
    pub latest_published: Option<DateTime<Utc>>,
    pub oldest_published: Option<DateTime<Utc>>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    /// Record published `minutes` after a fixed epoch.
    pub fn video(id: &str, title: &str, minutes: i64) -> VideoRecord {
        let published_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
            + chrono::Duration::minutes(minutes);
        VideoRecord {
            video_id: id.to_string(),
            title: title.to_string(),
            description: String::new(),
            channel_id: "UC123".to_string(),
            channel_title: "Channel".to_string(),
            published_at,
            duration: Some("PT4M13S".to_string()),
            view_count: 42,
            thumbnails: Thumbnails::default(),
            fetched_at: published_at,
        }
    }
}
