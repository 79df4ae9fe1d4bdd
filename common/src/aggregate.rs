//! The cached per-key aggregate served to the dashboard.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A sliding-window aggregate for one `(endpoint, method)` pair.
///
/// Produced by the analytics metric engine (§4.5), cached in the metric
/// cache (§4.6) with a 5-minute TTL, and read verbatim by the metrics query
/// endpoint (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowAggregate {
    pub endpoint: String,
    pub method: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub request_count: u64,
    pub rps: f64,
    pub p50_latency_ms: f64,
    pub p90_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub error_rate: f64,
    pub error_count: u64,
    pub success_count: u64,
    pub upstream_service: String,
}

impl WindowAggregate {
    /// Invariant checks from §3/§8: `errorCount + successCount == requestCount`,
    /// `0 <= errorRate <= 100`, and the window never exceeds its configured span.
    #[must_use]
    pub fn is_internally_consistent(&self, window_seconds: i64) -> bool {
        self.error_count + self.success_count == self.request_count
            && (0.0..=100.0).contains(&self.error_rate)
            && self.rps >= 0.0
            && (self.window_end - self.window_start).num_seconds() <= window_seconds
    }
}
