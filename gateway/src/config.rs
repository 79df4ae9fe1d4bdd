//! Environment-driven configuration, loaded once at startup.
//!
//! Follows the plain `env::var` + `anyhow::Context` idiom rather than a
//! config-file crate: every option has a documented default and a single
//! environment variable.

use std::env;
use std::time::Duration;

use anyhow::Context;

/// Requests-per-minute default. §6 documents `1,000,000` but the config
/// default there is `60`; `60` is adopted here (see SPEC_FULL.md's resolved
/// Open Questions) as the sane per-client default.
const DEFAULT_RATE_LIMIT_RPM: u32 = 60;
const DEFAULT_TELEMETRY_QUEUE_CAPACITY: usize = 1_000_000;
const DEFAULT_TELEMETRY_BATCH_SIZE: usize = 1_000;
const DEFAULT_TELEMETRY_FLUSH_INTERVAL_MS: u64 = 500;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub auth_enabled: bool,
    /// Paths that bypass both the auth filter and the rate-limit filter.
    /// Unified from what was two divergent config keys in the source; see
    /// SPEC_FULL.md.
    pub skip_paths: Vec<String>,
    pub rate_limit_rpm: u32,
    pub rate_limit_redis_url: String,
    pub telemetry_enabled: bool,
    pub telemetry_batch_size: usize,
    pub telemetry_flush_interval: Duration,
    pub telemetry_queue_capacity: usize,
    pub analytics_url: String,
    /// `(path prefix, upstream base url)`, checked longest-prefix-first.
    pub routes: Vec<(String, String)>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let analytics_url = env::var("GATEWAY_TELEMETRY_ANALYTICS_URL")
            .context("GATEWAY_TELEMETRY_ANALYTICS_URL must be set")?;

        let routes = env::var("GATEWAY_ROUTES")
            .unwrap_or_default()
            .split(';')
            .filter(|s| !s.trim().is_empty())
            .map(|pair| {
                let (prefix, upstream) = pair
                    .split_once('=')
                    .with_context(|| format!("invalid GATEWAY_ROUTES entry: {pair}"))?;
                Ok::<_, anyhow::Error>((prefix.trim().to_owned(), upstream.trim().to_owned()))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut routes = routes;
        routes.sort_by_key(|(prefix, _)| std::cmp::Reverse(prefix.len()));

        Ok(Self {
            bind_addr: env::var("GATEWAY_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            auth_enabled: env_bool("GATEWAY_AUTH_ENABLED", true),
            skip_paths: env::var("GATEWAY_SKIP_PATHS")
                .unwrap_or_else(|_| "/health".into())
                .split(',')
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty())
                .collect(),
            rate_limit_rpm: env_positive_u32("GATEWAY_RATE_LIMIT_RPM", DEFAULT_RATE_LIMIT_RPM),
            rate_limit_redis_url: env::var("GATEWAY_RATE_LIMIT_REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
            telemetry_enabled: env_bool("GATEWAY_TELEMETRY_ENABLED", true),
            telemetry_batch_size: env_positive_usize(
                "GATEWAY_TELEMETRY_BATCH_SIZE",
                DEFAULT_TELEMETRY_BATCH_SIZE,
            ),
            telemetry_flush_interval: Duration::from_millis(env_positive_u64(
                "GATEWAY_TELEMETRY_FLUSH_INTERVAL_MS",
                DEFAULT_TELEMETRY_FLUSH_INTERVAL_MS,
            )),
            telemetry_queue_capacity: env_positive_usize(
                "GATEWAY_TELEMETRY_QUEUE_CAPACITY",
                DEFAULT_TELEMETRY_QUEUE_CAPACITY,
            ),
            analytics_url,
            routes,
        })
    }

    /// Whether `path` bypasses auth and rate-limiting.
    #[must_use]
    pub fn is_skip_path(&self, path: &str) -> bool {
        self.skip_paths.iter().any(|p| p == path)
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// A `0` or unparsable value falls back to `default`, per §7's ConfigError
/// rule ("fall back to sensible defaults if a capacity is zero or unset").
fn env_positive_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn env_positive_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn env_positive_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_path_matches_exact() {
        let cfg = Config {
            bind_addr: String::new(),
            auth_enabled: true,
            skip_paths: vec!["/health".into(), "/metrics".into()],
            rate_limit_rpm: 60,
            rate_limit_redis_url: String::new(),
            telemetry_enabled: true,
            telemetry_batch_size: 1,
            telemetry_flush_interval: Duration::from_millis(1),
            telemetry_queue_capacity: 1,
            analytics_url: String::new(),
            routes: vec![],
        };
        assert!(cfg.is_skip_path("/health"));
        assert!(!cfg.is_skip_path("/healthcheck"));
    }
}
