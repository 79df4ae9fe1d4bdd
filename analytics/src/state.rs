//! Shared application state, grounded on the teacher's `api::AppState` —
//! an explicitly-constructed struct rather than an implicit singleton,
//! per §9's steer away from global mutable state.

use std::sync::Arc;

use sqlx::PgPool;

use crate::cache::MetricCache;
use crate::config::Config;
use crate::engine::Engine;
use crate::sink::RawSink;

#[derive(Clone)]
pub struct AnalyticsState {
    pub config: Arc<Config>,
    pub db: PgPool,
    pub cache: MetricCache,
    pub engine: Arc<Engine>,
    pub raw_sink: Arc<RawSink>,
}
