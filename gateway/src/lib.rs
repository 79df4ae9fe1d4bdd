//! API gateway: authenticate → rate-limit → route → telemetry capture (C8),
//! plus the telemetry emitter (C7).

pub mod auth;
pub mod config;
pub mod handler;
pub mod ratelimit;
pub mod routing;
pub mod state;
pub mod telemetry;

pub use config::Config;
pub use state::GatewayState;
