// src/fetcher/testing.rs

use crate::error::{AppError, Result};
use crate::key_pool::ApiKeyLease;
use crate::models::Thumbnails;
use crate::youtube::{RawVideo, VideoSearchApi};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn raw_video(id: &str, title: &str) -> RawVideo {
    RawVideo {
        video_id: id.to_string(),
        title: title.to_string(),
        description: String::new(),
        channel_id: "UC1".to_string(),
        channel_title: "Channel".to_string(),
        published_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        duration: Some("PT1M".to_string()),
        view_count: 1,
        thumbnails: Thumbnails::default(),
    }
}

/// Scripted upstream.
pub struct StubApi {
    videos: Vec<RawVideo>,
    quota_failures: usize,
    transient: bool,
    delay: Duration,
    calls: AtomicUsize,
    keys_used: Mutex<Vec<String>>,
    last_max_results: Mutex<Option<u32>>,
}

impl StubApi {
    pub fn returning(videos: Vec<RawVideo>) -> Self {
        Self {
            videos,
            quota_failures: 0,
            transient: false,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            keys_used: Mutex::new(Vec::new()),
            last_max_results: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            transient: true,
            ..Self::returning(Vec::new())
        }
    }

    /// Reject the first `n` calls for quota.
    pub fn quota_for_first(mut self, n: usize) -> Self {
        self.quota_failures = n;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn keys_used(&self) -> Vec<String> {
        self.keys_used.lock().clone()
    }

    pub fn last_max_results(&self) -> Option<u32> {
        *self.last_max_results.lock()
    }
}

#[async_trait]
impl VideoSearchApi for StubApi {
    async fn search(&self, key: &ApiKeyLease, _query: &str, max_results: u32) -> Result<Vec<RawVideo>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.keys_used.lock().push(key.fingerprint().to_string());
        *self.last_max_results.lock() = Some(max_results);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if call < self.quota_failures {
            return Err(AppError::QuotaExceeded {
                key_id: key.fingerprint().to_string(),
            });
        }
        if self.transient {
            return Err(AppError::transient("connection reset by peer"));
        }
        Ok(self.videos.iter().take(max_results as usize).cloned().collect())
    }
}
