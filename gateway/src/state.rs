//! Shared gateway state, grounded on the teacher's `api::AppState` — an
//! explicitly-constructed state struct passed into handlers, per §9's
//! steer away from implicit global singletons.

use std::sync::Arc;

use crate::config::Config;
use crate::ratelimit::RateLimiter;
use crate::telemetry::TelemetryEmitter;

#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub rate_limiter: RateLimiter,
    pub http_client: reqwest::Client,
    pub telemetry: TelemetryEmitter,
}
