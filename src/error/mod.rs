//! Error handling for the fetcher, the stores and the HTTP surface.
//!
//! Every failure is an [`AppError`]. Handlers return it directly and rely on
//! the [`IntoResponse`] impl, which renders an RFC 7807 style problem body.
//! The background cycle inspects the same values through [`AppError::is_quota`]
//! and [`AppError::is_transient`] to decide between key rotation and skipping.

pub mod types;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

/// Standard error response format following RFC 7807 Problem Details
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// A URI reference that identifies the problem type
    #[serde(rename = "type")]
    pub error_type: String,

    /// A short, human-readable summary of the problem type
    pub title: String,

    /// The HTTP status code
    pub status: u16,

    /// A human-readable explanation specific to this occurrence
    pub detail: String,

    /// A URI reference that identifies the specific occurrence
    pub instance: String,

    /// Request ID for tracing
    pub request_id: Option<String>,
}

#[derive(Error, Debug)]
pub enum AppError {
    // Configuration errors
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String, line: Option<usize> },

    // Storage errors
    #[error("Redis connection failed: {message}")]
    RedisConnection { message: String },

    #[error("Redis operation failed: {operation} - {message}")]
    RedisOperation { operation: String, message: String },

    #[error("Storage persistence failed: {message}")]
    StoragePersistence { message: String },

    // Upstream search API
    #[error("HTTP client error: {message}")]
    HttpClient { message: String, status_code: Option<u16> },

    #[error("Upstream search failed: {message}")]
    UpstreamTransient { message: String },

    #[error("Upstream request timed out after {timeout_secs}s")]
    RequestTimeout { timeout_secs: u64 },

    // Key pool
    #[error("API key quota exceeded: {key_id}")]
    QuotaExceeded { key_id: String },

    #[error("All API keys are exhausted")]
    PoolExhausted,

    // Validation errors
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Validation failed: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Request body too large: {size} bytes (max: {max_size})")]
    RequestTooLarge { size: usize, max_size: usize },

    // System errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("IO operation failed: {operation} - {message}")]
    Io { operation: String, message: String },
}

impl AppError {
    /// Create a new configuration validation error
    pub fn config_validation(message: impl Into<String>, field: Option<impl Into<String>>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
            field: field.map(Into::into),
        }
    }

    /// Create a new internal error with context
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::UpstreamTransient {
            message: message.into(),
        }
    }

    /// True when the upstream rejected the credential for quota reasons.
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }

    /// True for failures that only cost the current tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::UpstreamTransient { .. } | Self::RequestTimeout { .. } | Self::HttpClient { .. }
        )
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            Self::ConfigParse { .. }
            | Self::InvalidRequest { .. }
            | Self::Validation { .. }
            | Self::Serialization { .. } => StatusCode::BAD_REQUEST,

            // 404 Not Found
            Self::ConfigNotFound { .. } => StatusCode::NOT_FOUND,

            // 413 Payload Too Large
            Self::RequestTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,

            // 429 Too Many Requests
            Self::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            Self::ConfigValidation { .. }
            | Self::Internal { .. }
            | Self::StoragePersistence { .. }
            | Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            Self::HttpClient { .. } | Self::UpstreamTransient { .. } => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            Self::PoolExhausted | Self::RedisConnection { .. } => StatusCode::SERVICE_UNAVAILABLE,

            // 504 Gateway Timeout
            Self::RequestTimeout { .. } | Self::RedisOperation { .. } => {
                StatusCode::GATEWAY_TIMEOUT
            }
        }
    }

    /// Get the error type URI for RFC 7807 compliance
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::ConfigValidation { .. } | Self::ConfigNotFound { .. } | Self::ConfigParse { .. } => {
                "https://tube-feed.dev/errors/configuration"
            }
            Self::RedisConnection { .. }
            | Self::RedisOperation { .. }
            | Self::StoragePersistence { .. } => "https://tube-feed.dev/errors/storage",
            Self::HttpClient { .. } | Self::UpstreamTransient { .. } | Self::RequestTimeout { .. } => {
                "https://tube-feed.dev/errors/upstream"
            }
            Self::QuotaExceeded { .. } | Self::PoolExhausted => {
                "https://tube-feed.dev/errors/quota"
            }
            Self::Validation { .. } | Self::InvalidRequest { .. } | Self::RequestTooLarge { .. } => {
                "https://tube-feed.dev/errors/validation"
            }
            _ => "https://tube-feed.dev/errors/internal",
        }
    }

    /// Get a human-readable title for the error
    pub fn title(&self) -> &'static str {
        match self {
            Self::ConfigValidation { .. } | Self::ConfigNotFound { .. } | Self::ConfigParse { .. } => {
                "Configuration Error"
            }
            Self::RedisConnection { .. }
            | Self::RedisOperation { .. }
            | Self::StoragePersistence { .. } => "Storage Error",
            Self::HttpClient { .. } | Self::UpstreamTransient { .. } | Self::RequestTimeout { .. } => {
                "Upstream Error"
            }
            Self::QuotaExceeded { .. } | Self::PoolExhausted => "Quota Exhausted",
            Self::Validation { .. } | Self::InvalidRequest { .. } | Self::RequestTooLarge { .. } => {
                "Validation Error"
            }
            _ => "Internal Server Error",
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self, request_id: Option<&str>) {
        let request_id = request_id.unwrap_or("unknown");

        if self.status_code().is_server_error() {
            error!(
                error = %self,
                request_id = request_id,
                error_type = self.error_type(),
                "Application error occurred"
            );
        } else {
            warn!(
                error = %self,
                request_id = request_id,
                error_type = self.error_type(),
                "Client error occurred"
            );
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();

        self.log(Some(&request_id));

        let status = self.status_code();
        let error_response = ErrorResponse {
            error_type: self.error_type().to_string(),
            title: self.title().to_string(),
            status: status.as_u16(),
            detail: self.to_string(),
            instance: format!("/errors/{request_id}"),
            request_id: Some(request_id),
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for the application
pub type Result<T, E = AppError> = std::result::Result<T, E>;
