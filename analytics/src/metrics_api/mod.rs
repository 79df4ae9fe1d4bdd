//! Metrics query endpoint (C9), grounded on the teacher's
//! `observability::storage` query-helper style (clamped limits, simple
//! handler-level query functions) adapted from cursor-paginated log/trace
//! queries to the much smaller read surface this spec needs.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Duration as ChronoDuration, Utc};
use gateway_analytics_common::AggregationKey;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::state::AnalyticsState;

/// Upper bound on `?limit=` for `/metrics/top-endpoints`.
const MAX_TOP_ENDPOINTS_LIMIT: i64 = 100;
const DEFAULT_TOP_ENDPOINTS_LIMIT: i64 = 10;
const RPS_WINDOW_SECONDS: i64 = 60;

#[derive(Debug, Deserialize)]
pub struct EndpointQuery {
    pub method: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TopEndpointsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RpsResponse {
    pub rps: f64,
    pub window_seconds: i64,
}

#[derive(Debug, Serialize)]
pub struct TopEndpointEntry {
    pub endpoint: String,
    pub count: i64,
}

/// `GET /metrics/aggregated` — all cached aggregates (may be empty). A
/// cache scan failure yields an empty set rather than an error response,
/// per §7's `CacheUnavailable` rule — the sweeper must keep running either
/// way.
pub async fn aggregated(State(state): State<Arc<AnalyticsState>>) -> impl IntoResponse {
    Json(state.cache.scan_all().await)
}

/// `GET /metrics/endpoint/{path}?method=GET` — single aggregate or 404.
pub async fn endpoint(
    State(state): State<Arc<AnalyticsState>>,
    Path(path): Path<String>,
    Query(query): Query<EndpointQuery>,
) -> Response {
    let method = query.method.unwrap_or_else(|| "GET".to_owned());
    let key = AggregationKey::new(&path, &method);

    match state.cache.get(&key).await {
        Ok(Some(aggregate)) => Json(aggregate).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!(error = %e, %key, "metric cache read failed");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// `GET /metrics/rps` — raw-store request count over the last 60s.
pub async fn rps(State(state): State<Arc<AnalyticsState>>) -> impl IntoResponse {
    let since = Utc::now() - ChronoDuration::seconds(RPS_WINDOW_SECONDS);
    let count = match crate::db::count_since(&state.db, since).await {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "raw store unavailable, reporting rps as 0");
            0
        }
    };

    Json(RpsResponse {
        rps: count as f64 / RPS_WINDOW_SECONDS as f64,
        window_seconds: RPS_WINDOW_SECONDS,
    })
}

/// `GET /metrics/top-endpoints?limit=N` — top N paths by raw-store count
/// over the last 60s.
pub async fn top_endpoints(
    State(state): State<Arc<AnalyticsState>>,
    Query(query): Query<TopEndpointsQuery>,
) -> impl IntoResponse {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_TOP_ENDPOINTS_LIMIT)
        .clamp(1, MAX_TOP_ENDPOINTS_LIMIT);
    let since = Utc::now() - ChronoDuration::seconds(RPS_WINDOW_SECONDS);

    let rows = match crate::db::top_endpoints_since(&state.db, since, limit).await {
        Ok(rows) => rows,
        Err(e) => {
            warn!(error = %e, "raw store unavailable, returning empty top-endpoints");
            Vec::new()
        }
    };

    Json(
        rows.into_iter()
            .map(|row| TopEndpointEntry {
                endpoint: row.path,
                count: row.count,
            })
            .collect::<Vec<_>>(),
    )
}
