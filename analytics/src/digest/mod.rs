//! Percentile digest registry (C4).
//!
//! One streaming quantile estimator per aggregation key. `hdrhistogram`
//! stands in for the "t-digest or equivalent" requirement — it gives
//! bounded memory and bounded relative error for the p50/p90/p99 range this
//! engine needs, and the pack already reaches for it wherever percentile
//! math shows up. The "shard the map by key hash into N stripes" redesign
//! note is realized by `DashMap` itself: it *is* a sharded-mutex map, so no
//! hand-rolled striping is needed on top.

use std::sync::Arc;

use dashmap::DashMap;
use gateway_analytics_common::AggregationKey;
use hdrhistogram::Histogram;
use tokio::sync::Mutex;

/// Histogram value range: latencies from 1ms to 5 minutes, 3 significant
/// digits — bounded memory, comparable to "compression 100" in a t-digest.
const MIN_LATENCY_MS: u64 = 1;
const MAX_LATENCY_MS: u64 = 300_000;
const SIGNIFICANT_DIGITS: u8 = 3;

#[derive(Default)]
pub struct DigestRegistry {
    digests: DashMap<AggregationKey, Arc<Mutex<Histogram<u64>>>>,
}

impl DigestRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            digests: DashMap::new(),
        }
    }

    /// Record one latency observation for `key`, creating the digest on
    /// first observation.
    pub async fn observe(&self, key: &AggregationKey, latency_ms: u64) {
        let entry = self
            .digests
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(
                    Histogram::new_with_bounds(MIN_LATENCY_MS, MAX_LATENCY_MS, SIGNIFICANT_DIGITS)
                        .expect("static histogram bounds are valid"),
                ))
            })
            .clone();

        let clamped = latency_ms.clamp(MIN_LATENCY_MS, MAX_LATENCY_MS);
        let mut histogram = entry.lock().await;
        let _ = histogram.record(clamped);
    }

    /// Query p50/p90/p99 for `key`. Returns `None` if no digest exists yet
    /// (first observation hasn't landed, or the key has aged out) — callers
    /// fall back to sorting the raw event sample in that case.
    pub async fn percentiles(&self, key: &AggregationKey) -> Option<(f64, f64, f64)> {
        let entry = self.digests.get(key)?.clone();
        let histogram = entry.lock().await;
        if histogram.is_empty() {
            return None;
        }
        Some((
            histogram.value_at_quantile(0.50) as f64,
            histogram.value_at_quantile(0.90) as f64,
            histogram.value_at_quantile(0.99) as f64,
        ))
    }

    /// Drop the digest for `key` once its event buffer has emptied (C5's
    /// aging rule: "if buffer[k] becomes empty, drop digest[k]").
    pub fn drop_key(&self, key: &AggregationKey) {
        self.digests.remove(key);
    }

    #[must_use]
    pub fn contains(&self, key: &AggregationKey) -> bool {
        self.digests.contains_key(key)
    }
}

/// Fallback quantile estimate from a raw sample, used when the digest is
/// unavailable or empty (§4.5: "index at ⌊N·q⌋").
#[must_use]
pub fn percentile_from_sorted_samples(sorted: &[u64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64) * q).floor() as usize;
    let idx = idx.min(sorted.len() - 1);
    sorted[idx] as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn observe_then_query_returns_percentiles() {
        let registry = DigestRegistry::new();
        let key = AggregationKey::new("/api/users", "GET");
        for ms in [10, 20, 30, 40, 50] {
            registry.observe(&key, ms).await;
        }
        let (p50, p90, p99) = registry.percentiles(&key).await.unwrap();
        assert!(p50 > 0.0 && p90 >= p50 && p99 >= p90);
    }

    #[tokio::test]
    async fn missing_key_returns_none() {
        let registry = DigestRegistry::new();
        let key = AggregationKey::new("/nope", "GET");
        assert!(registry.percentiles(&key).await.is_none());
    }

    #[tokio::test]
    async fn drop_key_removes_digest() {
        let registry = DigestRegistry::new();
        let key = AggregationKey::new("/api/users", "GET");
        registry.observe(&key, 10).await;
        assert!(registry.contains(&key));
        registry.drop_key(&key);
        assert!(!registry.contains(&key));
    }

    #[test]
    fn percentile_from_sorted_samples_indexes_correctly() {
        let samples = vec![10, 20, 30, 40, 50];
        assert!((percentile_from_sorted_samples(&samples, 0.5) - 30.0).abs() < f64::EPSILON);
    }
}
