// src/lib.rs

pub mod admin;
pub mod cache;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod fetcher;
pub mod handlers;
pub mod key_pool;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod query;
pub mod state;
pub mod storage;
pub mod youtube;

use crate::handlers::{fetch_videos, get_stats, health_check, list_videos, search_videos};
use axum::{
    body::Body,
    http::{HeaderValue, Request as AxumRequest},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::{path::PathBuf, sync::Arc, time::Duration, time::Instant};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

pub use config::AppConfig;
pub use error::{AppError, Result};
pub use state::AppState;

/// Builds the full router: public API, admin surface and the request
/// middleware stack.
pub fn create_router(state: Arc<AppState>) -> Router {
    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/api/videos", get(list_videos))
        .route("/api/videos/search", get(search_videos))
        .route("/api/videos/fetch", post(fetch_videos))
        .route("/api/stats", get(get_stats))
        .merge(admin::admin_routes())
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(axum::middleware::from_fn(crate::middleware::request_size_limit_middleware))
        .layer(axum::middleware::from_fn(trace_requests))
}

/// Assigns a request id, runs the request inside a span and echoes the id
/// back as `X-Request-ID`.
async fn trace_requests(mut req: AxumRequest<Body>, next: axum::middleware::Next) -> impl IntoResponse {
    let request_id = Uuid::new_v4();
    let start_time = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let span = info_span!(
        "request",
        request_id = %request_id,
        http.method = %method,
        url.path = %path,
    );

    req.extensions_mut().insert(request_id);

    async move {
        let mut response = next.run(req).await;
        let elapsed = start_time.elapsed();

        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert("X-Request-ID", value);
        }

        info!(
            http.response.duration = ?elapsed,
            http.status_code = response.status().as_u16(),
            "Finished processing request"
        );

        response
    }
    .instrument(span)
    .await
}

/// Loads configuration, builds the shared state and the router.
///
/// The background fetcher is not started here; the caller owns its lifecycle.
pub async fn run(
    config_path_override: Option<PathBuf>,
    port_override: Option<u16>,
) -> Result<(Router, AppConfig, Arc<AppState>)> {
    info!("Starting tube-feed...");

    let mut app_config = setup_configuration(config_path_override)?;
    if let Some(port) = port_override {
        app_config.server.port = port;
    }

    let app_state = build_application_state(&app_config).await?;
    let app = create_router(app_state.clone());

    Ok((app, app_config, app_state))
}

/// Resolves the config path (override, then `CONFIG_PATH`, then
/// `config.yaml`), loads and validates it.
pub fn setup_configuration(config_path_override: Option<PathBuf>) -> Result<AppConfig> {
    let config_path = config_path_override.unwrap_or_else(|| {
        std::env::var("CONFIG_PATH").map_or_else(|_| PathBuf::from("config.yaml"), PathBuf::from)
    });

    let config_path_display = config_path.display().to_string();
    if config_path.exists() {
        info!(config.path = %config_path_display, "Using configuration file");
    } else {
        info!(config.path = %config_path_display, "Optional configuration file not found. Using defaults and environment variables.");
    }

    let app_config = config::load_config(&config_path).map_err(|e| {
        error!(
            config.path = %config_path_display,
            error = ?e,
            "Failed to load or validate configuration. Exiting."
        );
        e
    })?;

    info!(
        config.total_keys = app_config.api_keys().count(),
        config.queries = app_config.fetcher.queries.len(),
        fetcher.enabled = app_config.fetcher.enabled,
        fetcher.interval_secs = app_config.fetcher.interval_secs,
        server.port = app_config.server.port,
        "Configuration loaded and validated successfully."
    );

    Ok(app_config)
}

async fn build_application_state(app_config: &AppConfig) -> Result<Arc<AppState>> {
    let app_state = AppState::new(app_config).await.map_err(|e| {
        error!(error = ?e, "Failed to initialize application state. Exiting.");
        e
    })?;

    #[cfg(feature = "metrics")]
    let app_state = match metrics::initialize_metrics() {
        Ok(handle) => app_state.with_metrics(handle),
        Err(e) => {
            error!(error = %e, "Failed to install Prometheus recorder; metrics disabled");
            app_state
        }
    };

    info!("Application state initialized successfully.");
    Ok(Arc::new(app_state))
}
