// SPDX-License-Identifier: Apache-2.0

//! HTTP surface.
//!
//! Requests under `/api` pass, outermost first, through the security
//! headers, the request-size check and the general rate limiter; `/api/sql`
//! routes additionally pass the SQL rate limiter before reaching a handler.

mod docs;
mod error;
mod sql;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::{ConnectInfo, DefaultBodyLimit, FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{header, Extensions, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use sqlgate_core::limits::MAX_REQUEST_BYTES;

use crate::interceptor::ClientInfo;
use crate::rate_limit::{RateLimitDecision, RateLimiter};
use crate::AppState;

pub use error::ApiError;

const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

const SECURITY_HEADERS: [(HeaderName, &str); 6] = [
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::X_XSS_PROTECTION, "1; mode=block"),
    (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
    (header::PRAGMA, "no-cache"),
    (header::EXPIRES, "0"),
];

pub fn router(state: AppState) -> Router {
    let sql = Router::new()
        .route("/execute", post(sql::execute))
        .route("/validate", post(sql::validate))
        .route("/test", get(sql::test_connection))
        .route("/stats", get(sql::stats))
        .route("/docs", get(docs::docs))
        .layer(middleware::from_fn_with_state(state.clone(), sql_rate_limit));

    let api = Router::new()
        .nest("/sql", sql)
        .layer(middleware::from_fn_with_state(state.clone(), general_rate_limit))
        .layer(middleware::from_fn(reject_oversized))
        .layer(middleware::from_fn(security_headers));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// RFC 3339 UTC timestamp with millisecond precision.
pub(crate) fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Resolves the caller from the socket address. The first
/// `X-Forwarded-For` hop is used instead only when `trust_proxy` is set.
pub(crate) fn client_info(
    headers: &HeaderMap,
    extensions: &Extensions,
    trust_proxy: bool,
) -> ClientInfo {
    let forwarded = trust_proxy
        .then(|| headers.get("x-forwarded-for"))
        .flatten()
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string);

    let ip = forwarded
        .or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string());

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .filter(|ua| !ua.is_empty())
        .unwrap_or("unknown");

    ClientInfo::new(ip, user_agent)
}

impl FromRequestParts<AppState> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(client_info(
            &parts.headers,
            &parts.extensions,
            state.config.trust_proxy,
        ))
    }
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in SECURITY_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
    response
}

/// Refuses bodies whose declared length exceeds the ceiling. Undeclared
/// bodies are capped while streaming by `DefaultBodyLimit`.
async fn reject_oversized(request: Request, next: Next) -> Response {
    let declared = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());

    if let Some(size) = declared.filter(|size| *size > MAX_REQUEST_BYTES as u64) {
        tracing::warn!(size, limit = MAX_REQUEST_BYTES, "Request body too large");
        return ApiError::too_large(Some(size), MAX_REQUEST_BYTES).into_response();
    }
    next.run(request).await
}

async fn general_rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    admit(
        &state,
        &state.general_limiter,
        "Too many requests, please try again later.",
        request,
        next,
    )
    .await
}

async fn sql_rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    admit(
        &state,
        &state.sql_limiter,
        "Too many SQL requests, please try again later.",
        request,
        next,
    )
    .await
}

async fn admit(
    state: &AppState,
    limiter: &RateLimiter,
    message: &'static str,
    request: Request,
    next: Next,
) -> Response {
    let client = client_info(
        request.headers(),
        request.extensions(),
        state.config.trust_proxy,
    );
    let decision = limiter.check(&client.key());

    if !decision.allowed {
        state.pipeline.metrics().record_rate_limited();
        tracing::warn!(
            client_ip = %client.ip,
            path = %request.uri().path(),
            retry_after_secs = decision.retry_after_secs,
            "Rate limit exceeded"
        );
        let mut response = ApiError::new(StatusCode::TOO_MANY_REQUESTS, message)
            .with_code("RATE_LIMIT_EXCEEDED")
            .with_retry_after(decision.retry_after_secs)
            .into_response();
        rate_limit_headers(response.headers_mut(), &decision);
        return response;
    }

    let mut response = next.run(request).await;
    rate_limit_headers(response.headers_mut(), &decision);
    response
}

/// The innermost (strictest) limiter's values win.
fn rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    let values = [
        ("ratelimit-limit", u64::from(decision.limit)),
        ("ratelimit-remaining", u64::from(decision.remaining)),
        ("ratelimit-reset", decision.retry_after_secs),
    ];
    for (name, value) in values {
        headers
            .entry(HeaderName::from_static(name))
            .or_insert_with(|| HeaderValue::from(value));
    }
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let executor = state.pipeline.executor();
    let probe = tokio::time::timeout(HEALTH_PROBE_TIMEOUT, executor.test_connection()).await;

    let database = match probe {
        Ok(Ok(_)) => "connected",
        Ok(Err(_)) => "unavailable",
        Err(_) => "timeout",
    };

    Json(json!({
        "status": if database == "connected" { "healthy" } else { "degraded" },
        "timestamp": timestamp(),
        "uptime": state.started_at.elapsed().as_secs_f64(),
        "database": {
            "status": database,
            "poolStats": executor.pool_stats(),
        },
    }))
}

async fn not_found() -> ApiError {
    ApiError::not_found()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn socket(ip: [u8; 4]) -> Extensions {
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from((ip, 4000))));
        extensions
    }

    #[test]
    fn test_forwarded_hop_used_only_behind_trusted_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8.5"));
        let extensions = socket([127, 0, 0, 1]);

        assert_eq!(
            client_info(&headers, &extensions, true).key(),
            "203.0.113.9-curl/8.5"
        );
        assert_eq!(
            client_info(&headers, &extensions, false).key(),
            "127.0.0.1-curl/8.5"
        );
    }

    #[test]
    fn test_client_falls_back_to_socket_then_unknown() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" "));
        assert_eq!(
            client_info(&headers, &socket([192, 168, 1, 7]), true).key(),
            "192.168.1.7-unknown"
        );
        assert_eq!(
            client_info(&HeaderMap::new(), &Extensions::new(), false).key(),
            "unknown-unknown"
        );
    }
}
