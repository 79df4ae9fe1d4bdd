//! The gateway's filter chain (C8), implemented as a single handler rather
//! than a stack of `axum` middleware layers.
//!
//! §9's Design Notes call for "structured request middleware with one
//! deferred on-complete callback ... rather than registering success/error/
//! final separately"; threading authenticate → rate-limit → route as three
//! independent `axum::middleware::from_fn` layers would reintroduce exactly
//! the multi-hook problem the notes warn about (and makes the strict
//! ordering and "continue the chain after 429" rule fragile to layer
//! ordering). A single function with one linear control flow and one
//! [`CaptureGuard`] covers the whole chain with no ambiguity.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::auth::authenticate;
use crate::routing::{match_route, proxy, RouteError};
use crate::state::GatewayState;
use crate::telemetry::CaptureGuard;

pub async fn filter_chain(
    State(state): State<Arc<GatewayState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_owned();
    let method = parts.method.clone();
    let user_agent = parts
        .headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let remote_addr = connect_info.map(|c| c.0.ip().to_string());

    let mut guard = CaptureGuard::new(
        state.telemetry.clone(),
        state.config.telemetry_enabled,
        path.clone(),
        method.to_string(),
        user_agent,
        remote_addr.clone(),
    );

    let skip = state.config.is_skip_path(&path);
    let mut client_id: Option<String> = None;

    // Step 1: authenticate. Disabled entirely via `gateway.auth.enabled`
    // (§6), independent of the skip-path list.
    if state.config.auth_enabled && !skip {
        match authenticate(&parts.headers) {
            Ok(ctx) => {
                guard.set_auth(ctx.client_id.clone(), ctx.api_key);
                client_id = Some(ctx.client_id);
            }
            Err(e) => {
                let status = StatusCode::UNAUTHORIZED.as_u16();
                let error_type = e.error_type().to_owned();
                guard.finish(status, Some(error_type));
                return e.into_response();
            }
        }
    }

    // Step 2: rate-limit. Exceeding the limit never short-circuits here —
    // the chain must still reach telemetry capture (§4.1) — but it does
    // skip routing: proxying a request we've already decided to reject
    // would defeat the limit's purpose.
    let identifier = client_id
        .clone()
        .or(remote_addr)
        .unwrap_or_else(|| "unknown".to_owned());

    if !skip {
        use crate::ratelimit::RateLimitOutcome;
        match state.rate_limiter.check(&identifier).await {
            RateLimitOutcome::Exceeded { limit } => {
                guard.finish(
                    StatusCode::TOO_MANY_REQUESTS.as_u16(),
                    Some("rate_limit_exceeded".to_owned()),
                );
                return rate_limited_response(limit);
            }
            RateLimitOutcome::Allowed { .. } | RateLimitOutcome::FailedOpen => {}
        }
    }

    // Step 3: route.
    let route = match match_route(&state.config.routes, &path) {
        Some(r) => r,
        None => {
            let status = StatusCode::NOT_FOUND.as_u16();
            guard.finish(status, Some(RouteError::NoMatch.error_type().to_owned()));
            return RouteError::NoMatch.into_response();
        }
    };
    guard.set_route(route.route_id.clone(), route.upstream_service.clone());

    let body_bytes = match to_bytes(body, usize::MAX).await {
        Ok(b) => b,
        Err(e) => {
            error!(error = %e, "failed to buffer request body");
            guard.finish(500, Some("body_read_error".to_owned()));
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match proxy(&state.http_client, &route, method, &parts.headers, body_bytes).await {
        Ok((status, headers, body)) => {
            let error_type = if status.as_u16() >= 400 {
                Some("upstream_error".to_owned())
            } else {
                None
            };
            guard.finish(status.as_u16(), error_type);
            let mut response = Response::builder()
                .status(status)
                .body(Body::from(body))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
            *response.headers_mut() = headers;
            response
        }
        Err(e) => {
            let status = e.status_code();
            let error_type = e.error_type().to_owned();
            guard.finish(status.as_u16(), Some(error_type));
            e.into_response()
        }
    }
}

fn rate_limited_response(limit: u32) -> Response {
    let body = axum::Json(serde_json::json!({
        "error": "rate_limited",
        "message": "too many requests",
    }));
    let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
    insert_header(&mut response, "X-RateLimit-Limit", &limit.to_string());
    insert_header(&mut response, "X-RateLimit-Remaining", "0");
    response
}

fn insert_header(response: &mut Response, name: &'static str, value: &str) {
    if let (Ok(name), Ok(value)) = (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        response.headers_mut().insert(name, value);
    }
}
