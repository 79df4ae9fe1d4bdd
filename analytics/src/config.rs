//! Environment-driven configuration, mirroring `gateway::config::Config`'s
//! `env::var` + `anyhow::Context` idiom.

use std::env;
use std::time::Duration;

use anyhow::Context;

const DEFAULT_METRICS_WINDOW_SECONDS: i64 = 60;
const DEFAULT_AGGREGATION_INTERVAL_MS: u64 = 2_000;
const DEFAULT_BATCH_SIZE: usize = 5_000;
const DEFAULT_BATCH_FLUSH_INTERVAL_MS: u64 = 500;
const DEFAULT_QUEUE_CAPACITY: usize = 1_000_000;
const DEFAULT_WORKERS: usize = 8;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_url: String,
    pub redis_url: String,
    pub metrics_window_seconds: i64,
    pub metrics_aggregation_interval: Duration,
    pub batch_size: usize,
    pub batch_flush_interval: Duration,
    pub queue_capacity: usize,
    pub workers: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            bind_addr: env::var("ANALYTICS_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:9090".into()),
            database_url: env::var("ANALYTICS_DATABASE_URL")
                .context("ANALYTICS_DATABASE_URL must be set")?,
            redis_url: env::var("ANALYTICS_REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
            metrics_window_seconds: env_positive_i64(
                "ANALYTICS_METRICS_WINDOW_SECONDS",
                DEFAULT_METRICS_WINDOW_SECONDS,
            ),
            metrics_aggregation_interval: Duration::from_millis(env_positive_u64(
                "ANALYTICS_METRICS_AGGREGATION_INTERVAL_MS",
                DEFAULT_AGGREGATION_INTERVAL_MS,
            )),
            batch_size: env_positive_usize("ANALYTICS_BATCH_SIZE", DEFAULT_BATCH_SIZE),
            batch_flush_interval: Duration::from_millis(env_positive_u64(
                "ANALYTICS_BATCH_FLUSH_INTERVAL_MS",
                DEFAULT_BATCH_FLUSH_INTERVAL_MS,
            )),
            queue_capacity: env_positive_usize("ANALYTICS_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY),
            workers: env_positive_usize("ANALYTICS_WORKERS", DEFAULT_WORKERS),
        })
    }
}

fn env_positive_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
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

fn env_positive_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_positive_usize_falls_back_on_zero() {
        std::env::remove_var("ANALYTICS_TEST_ZERO");
        std::env::set_var("ANALYTICS_TEST_ZERO", "0");
        assert_eq!(env_positive_usize("ANALYTICS_TEST_ZERO", 42), 42);
        std::env::remove_var("ANALYTICS_TEST_ZERO");
    }
}
