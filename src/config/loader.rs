// src/config/loader.rs

use crate::config::{AppConfig, ConfigValidator};
use crate::error::{AppError, Result};
use std::path::Path;
use tracing::{debug, info, warn};

/// Environment variables holding the rotating keys, in rotation order.
pub const API_KEY_ENV_VARS: [&str; 3] = ["YOUTUBE_API_KEY", "YOUTUBE_API_KEY_2", "YOUTUBE_API_KEY_3"];

/// Load configuration from file or environment variables
pub fn load_config(config_path: &Path) -> Result<AppConfig> {
    let mut config = if config_path.exists() {
        info!("Loading configuration from file: {}", config_path.display());
        load_from_file(config_path)?
    } else {
        info!("Configuration file not found, using defaults");
        AppConfig::default()
    };

    override_with_env(&mut config);

    ConfigValidator::validate(&config)?;

    debug!("Configuration loaded and validated successfully");
    Ok(config)
}

fn load_from_file(config_path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(config_path).map_err(|_| AppError::ConfigNotFound {
        path: config_path.display().to_string(),
    })?;

    if content.trim().is_empty() {
        warn!("Config file '{}' is empty. Using defaults.", config_path.display());
        return Ok(AppConfig::default());
    }

    serde_yaml::from_str(&content).map_err(|e| AppError::ConfigParse {
        message: format!("Failed to parse config file: {e}"),
        line: e.location().map(|loc| loc.line()),
    })
}

fn override_with_env(config: &mut AppConfig) {
    let env_keys: Vec<String> = API_KEY_ENV_VARS
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();
    if !env_keys.is_empty() {
        info!(
            keys = env_keys.len(),
            "Overriding YouTube API keys from environment variables"
        );
        config.youtube.api_keys = env_keys;
    }

    if let Ok(redis_url) = std::env::var("REDIS_URL") {
        info!("Overriding Redis URL from environment variable");
        config.redis_url = Some(redis_url);
    }

    if let Ok(port_str) = std::env::var("PORT") {
        if let Ok(port) = port_str.parse::<u16>() {
            info!("Overriding server port from environment variable: {}", port);
            config.server.port = port;
        } else {
            warn!("Invalid PORT environment variable: {}", port_str);
        }
    }

    if let Ok(interval_str) = std::env::var("FETCH_INTERVAL_SECS") {
        match interval_str.parse::<u64>() {
            Ok(secs) => {
                info!("Overriding fetch interval from environment: {}s", secs);
                config.fetcher.interval_secs = secs;
            }
            Err(_) => warn!("Invalid FETCH_INTERVAL_SECS environment variable: {}", interval_str),
        }
    }

    if let Ok(enabled_str) = std::env::var("FETCH_ENABLED") {
        match enabled_str.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => config.fetcher.enabled = true,
            "0" | "false" | "no" | "off" => config.fetcher.enabled = false,
            other => warn!("Invalid FETCH_ENABLED environment variable: {}", other),
        }
    }
}
