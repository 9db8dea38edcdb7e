// src/config/mod.rs

pub mod app;
pub mod loader;
pub mod validation;

pub use app::{
    AppConfig, CacheConfig, FetcherConfig, QuotaConfig, ServerConfig, YouTubeConfig, MAX_API_KEYS,
    MAX_EXHAUSTED_BACKOFF_SECS, MAX_PUBLISHED_WITHIN_DAYS, UPSTREAM_MAX_RESULTS,
};
pub use loader::{load_config, API_KEY_ENV_VARS};
pub use validation::ConfigValidator;
