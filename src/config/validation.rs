// src/config/validation.rs

use crate::config::{
    AppConfig, MAX_API_KEYS, MAX_EXHAUSTED_BACKOFF_SECS, MAX_PUBLISHED_WITHIN_DAYS, UPSTREAM_MAX_RESULTS,
};
use crate::error::{AppError, Result};
use std::collections::HashSet;
use tracing::{debug, warn};
use url::Url;

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &AppConfig) -> Result<()> {
        debug!("Starting configuration validation");

        if let Err(e) = Self::validate_keys(config) {
            warn!("API key validation failed: {}", e);
            return Err(e);
        }

        if let Err(e) = Self::validate_youtube(config) {
            warn!("Upstream config validation failed: {}", e);
            return Err(e);
        }

        if let Err(e) = Self::validate_fetcher(config) {
            warn!("Fetcher config validation failed: {}", e);
            return Err(e);
        }

        if let Err(e) = Self::validate_redis_config(config) {
            warn!("Redis config validation failed: {}", e);
            return Err(e);
        }

        if let Err(e) = Self::validate_server_config(config) {
            warn!("Server config validation failed: {}", e);
            return Err(e);
        }

        debug!("Configuration validation completed successfully");
        Ok(())
    }

    fn validate_keys(config: &AppConfig) -> Result<()> {
        let keys = &config.youtube.api_keys;

        if keys.is_empty() {
            warn!("No YouTube API keys configured; every fetch will fail until keys are provided");
            return Ok(());
        }

        if keys.len() > MAX_API_KEYS {
            return Err(AppError::config_validation(
                format!("At most {MAX_API_KEYS} API keys are supported, got {}", keys.len()),
                Some("youtube.api_keys"),
            ));
        }

        let mut seen = HashSet::new();
        for key in keys {
            if key.trim().is_empty() {
                return Err(AppError::config_validation(
                    "API keys must not be empty strings",
                    Some("youtube.api_keys"),
                ));
            }
            if !seen.insert(key.trim()) {
                return Err(AppError::config_validation(
                    format!("Duplicate API key: {}", Self::preview_key(key)),
                    Some("youtube.api_keys"),
                ));
            }
        }

        debug!("Validated {} API keys", keys.len());
        Ok(())
    }

    fn validate_youtube(config: &AppConfig) -> Result<()> {
        Self::validate_url(&config.youtube.base_url, "youtube.base_url")?;

        if config.youtube.request_timeout_secs == 0 {
            return Err(AppError::config_validation(
                "Upstream request timeout cannot be 0",
                Some("youtube.request_timeout_secs"),
            ));
        }

        if config.youtube.connect_timeout_secs == 0 {
            return Err(AppError::config_validation(
                "Upstream connect timeout cannot be 0",
                Some("youtube.connect_timeout_secs"),
            ));
        }

        let days = config.youtube.published_within_days;
        if days <= 0 || days > MAX_PUBLISHED_WITHIN_DAYS {
            return Err(AppError::config_validation(
                format!("published_within_days must be in 1..={MAX_PUBLISHED_WITHIN_DAYS}, got {days}"),
                Some("youtube.published_within_days"),
            ));
        }

        if config.quota.reset_hour_utc > 23 {
            return Err(AppError::config_validation(
                format!("reset_hour_utc must be in 0..=23, got {}", config.quota.reset_hour_utc),
                Some("quota.reset_hour_utc"),
            ));
        }

        Ok(())
    }

    fn validate_fetcher(config: &AppConfig) -> Result<()> {
        let fetcher = &config.fetcher;

        if fetcher.interval_secs == 0 {
            return Err(AppError::config_validation(
                "Fetch interval cannot be 0",
                Some("fetcher.interval_secs"),
            ));
        }

        if fetcher.queries.iter().all(|q| q.trim().is_empty()) {
            return Err(AppError::config_validation(
                "At least one non-empty fetch query must be configured",
                Some("fetcher.queries"),
            ));
        }

        if fetcher.max_results == 0 || fetcher.max_results > UPSTREAM_MAX_RESULTS {
            return Err(AppError::config_validation(
                format!(
                    "fetcher.max_results must be in 1..={UPSTREAM_MAX_RESULTS}, got {}",
                    fetcher.max_results
                ),
                Some("fetcher.max_results"),
            ));
        }

        if fetcher.exhausted_backoff_secs > MAX_EXHAUSTED_BACKOFF_SECS {
            return Err(AppError::config_validation(
                format!(
                    "fetcher.exhausted_backoff_secs must be at most {MAX_EXHAUSTED_BACKOFF_SECS}, got {}",
                    fetcher.exhausted_backoff_secs
                ),
                Some("fetcher.exhausted_backoff_secs"),
            ));
        }

        if config.cache.max_entries == 0 {
            return Err(AppError::config_validation(
                "Cache must hold at least one entry",
                Some("cache.max_entries"),
            ));
        }

        Ok(())
    }

    fn validate_redis_config(config: &AppConfig) -> Result<()> {
        if let Some(redis_url) = &config.redis_url {
            Self::validate_url(redis_url, "redis_url")?;
        }
        Ok(())
    }

    fn validate_server_config(config: &AppConfig) -> Result<()> {
        // Port 0 lets the OS pick one, which only tests want.
        if config.server.port == 0 && !config.server.test_mode {
            return Err(AppError::config_validation(
                "Server port cannot be 0 (except in test mode)",
                Some("server.port"),
            ));
        }

        if config.server.request_timeout_secs == 0 {
            return Err(AppError::config_validation(
                "Request timeout cannot be 0",
                Some("server.request_timeout_secs"),
            ));
        }

        Ok(())
    }

    fn validate_url(url_str: &str, field_name: &str) -> Result<()> {
        Url::parse(url_str).map_err(|e| {
            AppError::config_validation(
                format!("Invalid URL in {}: {} - {}", field_name, url_str, e),
                Some(field_name),
            )
        })?;
        Ok(())
    }

    fn preview_key(key: &str) -> String {
        if key.len() > 8 {
            format!("{}...{}", &key[..4], &key[key.len() - 4..])
        } else {
            "***".to_string()
        }
    }
}
