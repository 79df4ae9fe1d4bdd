//! The telemetry record that crosses the gateway/analytics boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::path::normalize_path;

/// A single request's telemetry, emitted exactly once per request that
/// reaches the gateway's filter chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub request_id: String,
    pub path: String,
    pub method: String,
    pub status_code: u16,
    pub latency_ms: u64,
    #[serde(default = "unknown_client")]
    pub client_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub upstream_service: String,
    #[serde(default)]
    pub route_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

fn unknown_client() -> String {
    "unknown".to_owned()
}

impl TelemetryRecord {
    /// Whether this record is missing the fields the ingest endpoint
    /// requires to accept it (§4.3 validation rule).
    #[must_use]
    pub fn is_missing_required_fields(&self) -> bool {
        self.path.trim().is_empty() || self.method.trim().is_empty() || self.request_id.trim().is_empty()
    }

    /// Whether this record represents an error response (status >= 400).
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.status_code >= 400
    }

    /// Compute the aggregation key for this record, normalizing path and
    /// method identically to how the analytics engine keys its buffers.
    #[must_use]
    pub fn aggregation_key(&self) -> AggregationKey {
        AggregationKey::new(&self.path, &self.method)
    }
}

/// `(normalized path, uppercase method)` — the bucketing key shared by the
/// event buffer and the percentile digest registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregationKey {
    pub path: String,
    pub method: String,
}

impl AggregationKey {
    #[must_use]
    pub fn new(path: &str, method: &str) -> Self {
        Self {
            path: normalize_path(path),
            method: method.to_uppercase(),
        }
    }

    /// The Redis / cache key suffix used by the metric cache (§6 KV schema:
    /// `metrics:{path}:{METHOD}`).
    #[must_use]
    pub fn cache_suffix(&self) -> String {
        format!("{}:{}", self.path, self.method)
    }
}

impl std::fmt::Display for AggregationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TelemetryRecord {
        TelemetryRecord {
            request_id: "r1".into(),
            path: "/api/users/".into(),
            method: "get".into(),
            status_code: 200,
            latency_ms: 12,
            client_id: "abcdefgh".into(),
            api_key: "abcdefgh12345".into(),
            upstream_service: "users".into(),
            route_id: "users-route".into(),
            timestamp: Utc::now(),
            error_type: None,
            user_agent: None,
            ip_address: None,
        }
    }

    #[test]
    fn aggregation_key_normalizes_path_and_uppercases_method() {
        let key = sample().aggregation_key();
        assert_eq!(key.path, "/api/users");
        assert_eq!(key.method, "GET");
    }

    #[test]
    fn is_error_classifies_by_status() {
        let mut r = sample();
        assert!(!r.is_error());
        r.status_code = 404;
        assert!(r.is_error());
        r.status_code = 500;
        assert!(r.is_error());
    }

    #[test]
    fn missing_required_fields_detected() {
        let mut r = sample();
        assert!(!r.is_missing_required_fields());
        r.path.clear();
        assert!(r.is_missing_required_fields());
    }

    #[test]
    fn cache_suffix_matches_kv_schema() {
        let key = AggregationKey::new("/api/users", "get");
        assert_eq!(key.cache_suffix(), "/api/users:GET");
    }
}
