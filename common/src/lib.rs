//! Shared wire types for the gateway/analytics boundary.
//!
//! Both the gateway's telemetry emitter and the analytics service's ingest
//! endpoint serialize/deserialize [`TelemetryRecord`] over HTTP. Keeping the
//! type (and the path-normalization rules that key it) in one crate is what
//! keeps the "aggregation key used for buffering equals the key used for the
//! digest" invariant actually true across a process boundary.

pub mod aggregate;
pub mod path;
pub mod telemetry;

pub use aggregate::WindowAggregate;
pub use path::normalize_path;
pub use telemetry::{AggregationKey, TelemetryRecord};
