//! Telemetry ingest (C6): `POST /api/v1/telemetry/ingest/batch` and
//! `POST /api/v1/telemetry/ingest`.
//!
//! Grounded on the teacher's `api::mod` handler shape (state extraction,
//! JSON body, status-code response) and the validate-then-fan-out style of
//! `webhooks::dispatch` — except fan-out here is non-blocking local work
//! (sink enqueue + engine ingest) rather than a network call, so responses
//! never wait on it (§4.3: "the client must not wait for durability").

mod error;

pub use error::IngestError;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use gateway_analytics_common::TelemetryRecord;

use crate::state::AnalyticsState;

/// Records beyond this count fan out concurrently rather than sequentially.
const PARALLEL_FAN_OUT_THRESHOLD: usize = 100;

pub async fn ingest_batch(
    State(state): State<Arc<AnalyticsState>>,
    Json(records): Json<Vec<TelemetryRecord>>,
) -> Result<StatusCode, IngestError> {
    accept(&state, records).await
}

pub async fn ingest_single(
    State(state): State<Arc<AnalyticsState>>,
    Json(record): Json<TelemetryRecord>,
) -> Result<StatusCode, IngestError> {
    accept(&state, vec![record]).await
}

async fn accept(state: &AnalyticsState, records: Vec<TelemetryRecord>) -> Result<StatusCode, IngestError> {
    if records.is_empty() {
        return Err(IngestError::EmptyBatch);
    }

    let accepted: Vec<TelemetryRecord> = records
        .into_iter()
        .filter(|r| !r.is_missing_required_fields())
        .collect();

    if accepted.is_empty() {
        return Err(IngestError::AllRecordsInvalid);
    }

    let mut seen_keys = Vec::new();
    for record in &accepted {
        let key = record.aggregation_key();
        if !seen_keys.contains(&key) {
            seen_keys.push(key);
        }
    }

    if accepted.len() > PARALLEL_FAN_OUT_THRESHOLD {
        let fan_outs = accepted.iter().map(|record| fan_out_one(state, record));
        futures::future::join_all(fan_outs).await;
    } else {
        for record in &accepted {
            fan_out_one(state, record).await;
        }
    }

    for key in &seen_keys {
        state.engine.trigger_immediate(key);
    }

    Ok(StatusCode::ACCEPTED)
}

async fn fan_out_one(state: &AnalyticsState, record: &TelemetryRecord) {
    state.raw_sink.enqueue(record.clone());
    state.engine.ingest(record).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(path: &str) -> TelemetryRecord {
        TelemetryRecord {
            request_id: uuid::Uuid::new_v4().to_string(),
            path: path.to_owned(),
            method: "GET".to_owned(),
            status_code: 200,
            latency_ms: 10,
            client_id: "client".to_owned(),
            api_key: String::new(),
            upstream_service: "users".to_owned(),
            route_id: "users-route".to_owned(),
            timestamp: Utc::now(),
            error_type: None,
            user_agent: None,
            ip_address: None,
        }
    }

    #[test]
    fn invalid_record_is_detected_by_missing_required_fields() {
        let mut r = record("/api/users");
        r.path.clear();
        assert!(r.is_missing_required_fields());
    }

    #[test]
    fn valid_record_passes_required_field_check() {
        assert!(!record("/api/users").is_missing_required_fields());
    }
}
