// tests/admin_tests.rs

mod common;

use common::{
    assertions::assert_json_response,
    http::{get_request, post_request},
    upstream, TestApp, TestConfigBuilder,
};
use tower::util::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_status_reports_keys_by_fingerprint() {
    let config = TestConfigBuilder::new()
        .with_api_key("AIzaSecretOne")
        .with_api_key("AIzaSecretTwo")
        .build();
    let app = TestApp::new(config).await;

    let response = app.router.oneshot(get_request("/admin/status")).await.unwrap();
    let json = assert_json_response(response, 200).await;

    let keys = json["keys"].as_array().unwrap();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0]["exhausted"], false);
    assert_eq!(keys[0]["quota_used"], 0);
    assert!(!json.to_string().contains("AIzaSecret"));

    assert_eq!(json["scheduler"]["running"], false);
    assert_eq!(json["scheduler"]["ticks"], 0);
    assert_eq!(json["cache"]["total_entries"], 0);
    assert!(json["next_key_reset"].is_string());
}

#[tokio::test]
async fn test_key_reset_clears_exhaustion() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(403).set_body_json(upstream::quota_error()))
        .mount(&server)
        .await;

    let app = TestApp::with_upstream(&server).await;
    let fetch = app
        .router
        .clone()
        .oneshot(post_request("/api/videos/fetch", r#"{"query": "rust"}"#))
        .await
        .unwrap();
    assert_eq!(fetch.status().as_u16(), 503);
    assert!(app.state.key_pool.snapshot().await.unwrap().iter().all(|k| k.exhausted));

    let response = app
        .router
        .oneshot(post_request("/admin/keys/reset", ""))
        .await
        .unwrap();
    let json = assert_json_response(response, 200).await;

    let keys = json["keys"].as_array().unwrap();
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().all(|k| k["exhausted"] == false));
    assert!(app.state.key_pool.acquire_key().await.is_ok());
}

#[tokio::test]
async fn test_cache_clear_forces_upstream_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(upstream::search_page("rust", 3)))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/videos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(upstream::empty_details()))
        .mount(&server)
        .await;

    let app = TestApp::with_upstream(&server).await;
    let body = r#"{"query": "rust", "max_results": 3}"#;

    for _ in 0..2 {
        let response = app
            .router
            .clone()
            .oneshot(post_request("/api/videos/fetch", body))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    let response = app
        .router
        .clone()
        .oneshot(post_request("/admin/cache/clear", ""))
        .await
        .unwrap();
    let json = assert_json_response(response, 200).await;
    assert_eq!(json["cleared_entries"], 1);

    let response = app
        .router
        .oneshot(post_request("/api/videos/fetch", body))
        .await
        .unwrap();
    let json = assert_json_response(response, 200).await;
    assert_eq!(json["total_fetched"], 3);
    assert_eq!(json["stored_count"], 0);
}
