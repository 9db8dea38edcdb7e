// src/middleware/request_size_limit.rs

use crate::error::AppError;
use axum::{
    body::Body,
    extract::Request,
    http::{header::CONTENT_LENGTH, Method},
    middleware::Next,
    response::Response,
};
use tracing::warn;

/// The only body the API accepts is a small fetch request.
pub const MAX_REQUEST_SIZE: usize = 64 * 1024;

/// Rejects bodies whose declared `Content-Length` exceeds [`MAX_REQUEST_SIZE`].
pub async fn request_size_limit_middleware(
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let method = request.method();
    if matches!(*method, Method::POST | Method::PUT | Method::PATCH) {
        let declared = request
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());

        if let Some(size) = declared.filter(|&size| size > MAX_REQUEST_SIZE) {
            warn!(
                content_length = size,
                max_size = MAX_REQUEST_SIZE,
                method = %method,
                "Request rejected: body size exceeds limit"
            );
            return Err(AppError::RequestTooLarge {
                size,
                max_size: MAX_REQUEST_SIZE,
            });
        }
    }

    Ok(next.run(request).await)
}
