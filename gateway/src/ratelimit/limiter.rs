//! Per-client sliding-minute counter backed by Redis (C1).
//!
//! Grounded on the teacher's `ratelimit::limiter::RateLimiter` — same
//! `INCR` + "set TTL on first increment" shape as `record_failed_auth` —
//! but simplified from the teacher's per-category Lua-script atomic check to
//! a single global per-client limit, since this spec has exactly one
//! counter per client rather than nine categories.

use std::sync::Arc;

use fred::prelude::*;
use tracing::warn;

use super::error::RateLimitOutcome;

/// Window over which the per-client counter is enforced (§4.1: 60 s).
const WINDOW_SECS: i64 = 60;

#[derive(Clone)]
pub struct RateLimiter {
    redis: RedisClient,
    key_prefix: Arc<str>,
    requests_per_minute: u32,
}

impl RateLimiter {
    #[must_use]
    pub fn new(redis: RedisClient, requests_per_minute: u32) -> Self {
        Self {
            redis,
            key_prefix: Arc::from("rate_limit"),
            requests_per_minute,
        }
    }

    fn build_key(&self, client_id: &str) -> String {
        format!("{}:{}", self.key_prefix, client_id)
    }

    /// Increment the client's counter and decide whether the request is
    /// allowed. Fails open (allows the request) on any Redis error, per
    /// §4.1's explicit rule and §7's `ClientAuthError`-adjacent
    /// `RateLimitExceeded` taxonomy entry.
    #[tracing::instrument(skip(self), fields(client_id = %client_id))]
    pub async fn check(&self, client_id: &str) -> RateLimitOutcome {
        let key = self.build_key(client_id);

        let count: Result<i64, _> = self.redis.incr(&key).await;
        let count = match count {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "rate-limit counter store unreachable, failing open");
                return RateLimitOutcome::FailedOpen;
            }
        };

        if count == 1 {
            if let Err(e) = self.redis.expire::<(), _>(&key, WINDOW_SECS).await {
                warn!(error = %e, "failed to set TTL on new rate-limit window");
            }
        }

        let count = u32::try_from(count).unwrap_or(u32::MAX);
        if count > self.requests_per_minute {
            RateLimitOutcome::Exceeded {
                limit: self.requests_per_minute,
            }
        } else {
            RateLimitOutcome::Allowed {
                limit: self.requests_per_minute,
                remaining: self.requests_per_minute.saturating_sub(count),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_key_matches_kv_schema() {
        let redis = RedisClient::new(RedisConfig::from_url("redis://127.0.0.1:6379").unwrap(), None, None, None);
        let limiter = RateLimiter::new(redis, 60);
        assert_eq!(limiter.build_key("abcdefgh"), "rate_limit:abcdefgh");
    }
}
