//! Real-time analytics pipeline: telemetry ingest (C6), raw-event sink
//! (C2), event buffer + metric engine (C5), percentile digest registry
//! (C4), metric cache (C3), and the metrics query endpoint (C9).

pub mod cache;
pub mod config;
pub mod db;
pub mod digest;
pub mod engine;
pub mod ingest;
pub mod metrics_api;
pub mod sink;
pub mod state;

pub use config::Config;
pub use state::AnalyticsState;
