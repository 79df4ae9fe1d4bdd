//! Telemetry capture (§4.1 step 4, lowest precedence): builds exactly one
//! [`TelemetryRecord`] per request and hands it to the emitter.
//!
//! §9's Design Notes steer away from the source's three independent
//! success/error/final hook registrations toward "a single-shot construct...
//! with the emitter call inside the success branch" and "one deferred
//! on-complete callback". [`CaptureGuard`] realizes that as a single RAII
//! guard: the normal path calls [`CaptureGuard::finish`] explicitly (setting
//! the done flag before handing the record to C7, closing the race the
//! source needed a separate atomic for), and any other exit — an early
//! `return` or, via `Drop`, an unwinding panic — falls through to
//! `Drop::drop`, which emits a synthetic failure record if `finish` was never
//! called. Either way the emitter receives the record exactly once.

use chrono::Utc;
use gateway_analytics_common::TelemetryRecord;
use uuid::Uuid;

use super::emitter::TelemetryEmitter;

pub struct CaptureGuard {
    emitter: TelemetryEmitter,
    enabled: bool,
    start: tokio::time::Instant,
    request_id: String,
    path: String,
    method: String,
    client_id: String,
    api_key: String,
    route_id: String,
    upstream_service: String,
    user_agent: Option<String>,
    ip_address: Option<String>,
    done: bool,
}

impl CaptureGuard {
    /// `enabled` mirrors `gateway.telemetry.enabled` (§6): when `false`,
    /// `finish`/`Drop` still run (so the at-most-once bookkeeping stays
    /// simple) but never hand a record to the emitter.
    #[must_use]
    pub fn new(
        emitter: TelemetryEmitter,
        enabled: bool,
        path: String,
        method: String,
        user_agent: Option<String>,
        ip_address: Option<String>,
    ) -> Self {
        Self {
            emitter,
            enabled,
            start: tokio::time::Instant::now(),
            request_id: Uuid::new_v4().to_string(),
            path,
            method,
            client_id: "unknown".to_owned(),
            api_key: String::new(),
            route_id: String::new(),
            upstream_service: String::new(),
            user_agent,
            ip_address,
            done: false,
        }
    }

    pub fn set_auth(&mut self, client_id: String, api_key: String) {
        self.client_id = client_id;
        self.api_key = api_key;
    }

    pub fn set_route(&mut self, route_id: String, upstream_service: String) {
        self.route_id = route_id;
        self.upstream_service = upstream_service;
    }

    /// Finalize the record with the outcome and hand it to C7. Marks the
    /// guard done so `Drop` becomes a no-op — the single point at which
    /// "the flag" is set, per §4.1.
    pub fn finish(mut self, status_code: u16, error_type: Option<String>) {
        self.done = true;
        if !self.enabled {
            return;
        }
        let record = self.build(status_code, error_type);
        self.emitter.emit(record);
    }

    fn build(&self, status_code: u16, error_type: Option<String>) -> TelemetryRecord {
        TelemetryRecord {
            request_id: self.request_id.clone(),
            path: self.path.clone(),
            method: self.method.clone(),
            status_code,
            latency_ms: self.start.elapsed().as_millis() as u64,
            client_id: self.client_id.clone(),
            api_key: self.api_key.clone(),
            upstream_service: self.upstream_service.clone(),
            route_id: self.route_id.clone(),
            timestamp: Utc::now(),
            error_type,
            user_agent: self.user_agent.clone(),
            ip_address: self.ip_address.clone(),
        }
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        if !self.enabled {
            return;
        }
        let record = self.build(500, Some("aborted".to_owned()));
        self.emitter.emit(record);
    }
}
