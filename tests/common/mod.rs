//! Common test utilities and fixtures

#![allow(dead_code)]

use axum::Router;
use std::sync::Arc;
use tube_feed::{config::AppConfig, create_router, AppState};

/// Test configuration builder
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        config.fetcher.enabled = false;
        config.server.test_mode = true;
        Self { config }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.youtube.api_keys.push(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.youtube.base_url = url.into();
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Router plus the state behind it, backed by in-memory stores.
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
}

impl TestApp {
    pub async fn new(config: AppConfig) -> Self {
        let state = Arc::new(AppState::new(&config).await.unwrap());
        Self {
            router: create_router(state.clone()),
            state,
        }
    }

    /// Two keys, upstream pointed at the mock server.
    pub async fn with_upstream(server: &wiremock::MockServer) -> Self {
        let config = TestConfigBuilder::new()
            .with_api_key("test-key-1")
            .with_api_key("test-key-2")
            .with_base_url(server.uri())
            .build();
        Self::new(config).await
    }
}

/// Upstream payload builders
pub mod upstream {
    use serde_json::{json, Value};

    pub fn search_item(id: &str, title: &str, published_at: &str) -> Value {
        json!({
            "id": { "kind": "youtube#video", "videoId": id },
            "snippet": {
                "publishedAt": published_at,
                "channelId": "UC1",
                "title": title,
                "description": format!("Description of {title}"),
                "channelTitle": "Channel",
                "thumbnails": {
                    "default": { "url": format!("https://i.ytimg.com/vi/{id}/default.jpg") }
                }
            }
        })
    }

    /// `count` distinct search items, newest first.
    pub fn search_page(prefix: &str, count: usize) -> Value {
        let items: Vec<Value> = (0..count)
            .map(|i| {
                search_item(
                    &format!("{prefix}{i:02}"),
                    &format!("{prefix} video {i}"),
                    &format!("2024-05-01T{:02}:00:00Z", 23 - i),
                )
            })
            .collect();
        json!({ "items": items })
    }

    pub fn empty_details() -> Value {
        json!({ "items": [] })
    }

    pub fn quota_error() -> Value {
        json!({
            "error": {
                "code": 403,
                "message": "quota exceeded",
                "errors": [{ "reason": "quotaExceeded" }]
            }
        })
    }
}

/// Test utilities for HTTP requests
pub mod http {
    use axum::{body::Body, http::Request};

    pub fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    pub fn post_request(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }
}

/// Test assertions and utilities
pub mod assertions {
    use axum::{body::to_bytes, response::Response};
    use serde_json::Value;

    pub async fn assert_json_response(response: Response, expected_status: u16) -> Value {
        assert_eq!(response.status().as_u16(), expected_status);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).expect("Response body should be valid JSON")
    }

    pub async fn assert_error_response(response: Response, expected_status: u16, error_type: &str) -> Value {
        let json = assert_json_response(response, expected_status).await;
        assert_eq!(json["type"].as_str().unwrap(), error_type, "Error type mismatch");
        json
    }
}
