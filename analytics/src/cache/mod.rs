//! Metric cache (C3) — maps `"metrics:{path}:{METHOD}"` to a JSON-serialized
//! [`WindowAggregate`] with a 5-minute TTL.
//!
//! Grounded on the teacher's `fred` usage in `ratelimit::limiter` (`incr`/
//! `expire`) and `db::create_redis_client`; `SET … EX` / `GET` here play the
//! same role `INCR` + `EXPIRE` play there.

mod error;

pub use error::CacheError;

use fred::prelude::*;
use futures::StreamExt;
use gateway_analytics_common::{AggregationKey, WindowAggregate};
use tracing::warn;

const TTL_SECONDS: i64 = 300;
const SCAN_PAGE_SIZE: u32 = 100;
const KEY_PREFIX: &str = "metrics";

#[derive(Clone)]
pub struct MetricCache {
    redis: RedisClient,
}

impl MetricCache {
    #[must_use]
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }

    fn build_key(key: &AggregationKey) -> String {
        format!("{KEY_PREFIX}:{}", key.cache_suffix())
    }

    /// Synchronous (awaited inline) write on the compute critical path, so
    /// a dashboard read immediately after a compute always sees the latest
    /// aggregate (§4.5's "write into C3 synchronously").
    pub async fn put(&self, key: &AggregationKey, aggregate: &WindowAggregate) -> Result<(), CacheError> {
        let payload = serde_json::to_string(aggregate).map_err(CacheError::Serialize)?;
        self.redis
            .set::<(), _, _>(
                Self::build_key(key),
                payload,
                Some(Expiration::EX(TTL_SECONDS)),
                None,
                false,
            )
            .await
            .map_err(CacheError::Store)?;
        Ok(())
    }

    pub async fn get(&self, key: &AggregationKey) -> Result<Option<WindowAggregate>, CacheError> {
        let raw: Option<String> = self
            .redis
            .get(Self::build_key(key))
            .await
            .map_err(CacheError::Store)?;
        match raw {
            Some(s) => Ok(Some(
                serde_json::from_str(&s).map_err(CacheError::Serialize)?,
            )),
            None => Ok(None),
        }
    }

    /// Enumerate every cached aggregate via cursor-based `SCAN`, never a
    /// blocking `KEYS *`. Used by `GET /metrics/aggregated`. Errors are
    /// logged and treated as an empty set (§7: `CacheUnavailable`) rather
    /// than propagated, so C9 stays available during a cache outage.
    pub async fn scan_all(&self) -> Vec<WindowAggregate> {
        let pattern = format!("{KEY_PREFIX}:*");
        let mut aggregates = Vec::new();
        let mut scan_stream = self.redis.scan(pattern, Some(SCAN_PAGE_SIZE), None);

        while let Some(page) = scan_stream.next().await {
            let mut page = match page {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "metric cache scan failed, returning partial results");
                    break;
                }
            };

            if let Some(keys) = page.take_results() {
                if !keys.is_empty() {
                    let values: Result<Vec<Option<String>>, _> = self.redis.mget(keys).await;
                    if let Ok(values) = values {
                        for raw in values.into_iter().flatten() {
                            if let Ok(aggregate) = serde_json::from_str::<WindowAggregate>(&raw) {
                                aggregates.push(aggregate);
                            }
                        }
                    }
                }
            }

            if let Err(e) = page.next() {
                warn!(error = %e, "failed to advance metric cache scan cursor");
                break;
            }
        }

        aggregates
    }
}
