//! Request rate limiting.

use crate::auth::API_KEY_HEADER;
use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identity prefix for callers without a valid API key.
const ANONYMOUS_KEY_PREFIX: &str = "anon_";

/// Paths never rate limited.
const EXEMPT_PATHS: [&str; 1] = ["/health"];

/// Rate limiting middleware.
///
/// Callers with a valid key are limited by that key's budget; everyone else
/// shares the configured default budget per client IP. Rejected requests get
/// 429, every other response carries `X-RateLimit-*` headers.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if EXEMPT_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let known_key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| state.api_keys.validate_key(raw));

    let (identity, rate_limit) = match known_key {
        Some(key) => (key.key_id, key.rate_limit),
        None => (
            format!("{}{}", ANONYMOUS_KEY_PREFIX, extract_client_ip(&request)),
            state.config.auth.default_rate_limit,
        ),
    };

    let decision = state.api_keys.check_rate_limit(&identity, rate_limit);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    if !decision.allowed {
        return ApiError::RateLimitExceeded {
            limit: rate_limit,
            remaining: 0,
            reset: now + decision.retry_after,
            retry_after: decision.retry_after,
        }
        .into_response();
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(rate_limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(decision.remaining));
    headers.insert("X-RateLimit-Reset", HeaderValue::from(now + 60));
    response
}

/// Extract client IP from request.
fn extract_client_ip(request: &Request<Body>) -> String {
    if let Some(forwarded) = request.headers().get("X-Forwarded-For")
        && let Ok(value) = forwarded.to_str()
        && let Some(ip) = value.split(',').next()
    {
        return ip.trim().to_string();
    }

    if let Some(real_ip) = request.headers().get("X-Real-IP")
        && let Ok(value) = real_ip.to_str()
    {
        return value.to_string();
    }

    "unknown".to_string()
}
