//! Event buffer + metric engine (C5).
//!
//! Grounded on the teacher's per-key cardinality bookkeeping in
//! `observability::ingestion::NativeMetricExporter` (per-key maps guarded by
//! a registry, periodic flush-on-interval), generalized to the sliding
//! window aggregate computation in §4.5. `DashMap` (teacher dependency) maps
//! keys to `crossbeam_queue::SegQueue` event buffers; a `tokio::sync::
//! Semaphore` bounds the compute-task pool instead of a dedicated channel,
//! since each recompute decision is independent and short-lived.

mod buffer;

pub use buffer::BufferedEvent;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use crossbeam_queue::SegQueue;
use dashmap::DashMap;
use gateway_analytics_common::{AggregationKey, TelemetryRecord, WindowAggregate};
use tokio::sync::Semaphore;
use tracing::warn;

use crate::cache::MetricCache;
use crate::digest::{percentile_from_sorted_samples, DigestRegistry};
use buffer::{BURST_THRESHOLD, MIN_COMPUTE_INTERVAL_MS, WINDOW_GRACE_SECONDS};

/// Upper bound on concurrently in-flight compute tasks across all keys.
const MAX_CONCURRENT_COMPUTES: usize = 64;

pub struct Engine {
    buffers: Arc<DashMap<AggregationKey, Arc<SegQueue<BufferedEvent>>>>,
    last_compute_ms: Arc<DashMap<AggregationKey, Arc<AtomicI64>>>,
    upstream_services: Arc<DashMap<AggregationKey, String>>,
    digests: Arc<DigestRegistry>,
    cache: MetricCache,
    compute_permits: Arc<Semaphore>,
    window_seconds: i64,
}

impl Engine {
    #[must_use]
    pub fn new(cache: MetricCache, window_seconds: i64) -> Self {
        Self {
            buffers: Arc::new(DashMap::new()),
            last_compute_ms: Arc::new(DashMap::new()),
            upstream_services: Arc::new(DashMap::new()),
            digests: Arc::new(DigestRegistry::new()),
            cache,
            compute_permits: Arc::new(Semaphore::new(MAX_CONCURRENT_COMPUTES)),
            window_seconds,
        }
    }

    #[must_use]
    pub fn digests(&self) -> Arc<DigestRegistry> {
        self.digests.clone()
    }

    /// On ingest of one record: append to its buffer, feed the digest,
    /// and decide whether to recompute its aggregate now (§4.5 steps 1-4).
    pub async fn ingest(&self, record: &TelemetryRecord) {
        let key = record.aggregation_key();
        let buffer = self.get_or_create_buffer(&key);

        buffer.push(BufferedEvent {
            timestamp_ms: record.timestamp.timestamp_millis(),
            latency_ms: record.latency_ms,
            status_code: record.status_code,
        });

        self.digests.observe(&key, record.latency_ms).await;
        self.upstream_services
            .insert(key.clone(), record.upstream_service.clone());

        let buffer_len = buffer.len();
        self.maybe_spawn_compute(key, buffer, buffer_len >= BURST_THRESHOLD, false);
    }

    /// Force an immediate recompute for `key`, bypassing the debounce
    /// interval. Used by the ingest endpoint (§4.3) to surface new traffic
    /// with sub-two-second dashboard latency.
    pub fn trigger_immediate(&self, key: &AggregationKey) {
        let Some(buffer) = self.buffers.get(key).map(|b| b.clone()) else {
            return;
        };
        self.maybe_spawn_compute(key.clone(), buffer, true, true);
    }

    /// Periodic sweep (§4.5): recompute every known key even absent new
    /// events, bounded to a 5-second overall completion timeout.
    ///
    /// Routes through the same per-key CAS claim `maybe_spawn_compute` uses
    /// on the ingest path (§5: "periodic sweep and on-ingest path share this
    /// lock") rather than spawning `compute_key` directly — two computes for
    /// the same key racing on the shared `SegQueue` would split its events
    /// between them and could have one retire the key out from under the
    /// other's survivor push-back.
    pub async fn sweep(&self) {
        let keys: Vec<AggregationKey> = self.buffers.iter().map(|e| e.key().clone()).collect();
        let tasks: Vec<_> = keys
            .into_iter()
            .filter_map(|key| {
                let buffer = self.buffers.get(&key)?.clone();
                self.claim_and_spawn(key, buffer, true)
            })
            .collect();

        let joined = futures::future::join_all(tasks);
        if tokio::time::timeout(std::time::Duration::from_secs(5), joined)
            .await
            .is_err()
        {
            warn!("periodic sweep did not complete within 5s, continuing anyway");
        }
    }

    fn get_or_create_buffer(&self, key: &AggregationKey) -> Arc<SegQueue<BufferedEvent>> {
        self.buffers
            .entry(key.clone())
            .or_insert_with(|| Arc::new(SegQueue::new()))
            .clone()
    }

    /// Decide whether to recompute now, per §4.5 step 3-4, then spawn the
    /// compute task under a CAS claim so only the claimant submits it.
    fn maybe_spawn_compute(
        &self,
        key: AggregationKey,
        buffer: Arc<SegQueue<BufferedEvent>>,
        burst: bool,
        force: bool,
    ) {
        self.claim_and_spawn_with(key, buffer, burst, force);
    }

    /// Sweep entry point: always attempts the claim (the sweep itself is the
    /// "force" signal), returning the spawned task's `JoinHandle` so the
    /// sweep can bound its own completion. Shares `claim_and_spawn_with`
    /// with `maybe_spawn_compute` so both paths claim the same per-key CAS
    /// cell before ever touching the buffer.
    fn claim_and_spawn(
        &self,
        key: AggregationKey,
        buffer: Arc<SegQueue<BufferedEvent>>,
        force: bool,
    ) -> Option<tokio::task::JoinHandle<()>> {
        self.claim_and_spawn_with(key, buffer, false, force)
    }

    /// Shared CAS-claim-then-spawn body for both the ingest path and the
    /// sweep (§5: "at most one compute task can be in flight per key at a
    /// time ... periodic sweep and on-ingest path share this lock"). Returns
    /// the spawned task's handle only when this call won the claim.
    fn claim_and_spawn_with(
        &self,
        key: AggregationKey,
        buffer: Arc<SegQueue<BufferedEvent>>,
        burst: bool,
        force: bool,
    ) -> Option<tokio::task::JoinHandle<()>> {
        let now = Utc::now().timestamp_millis();
        let cell = self
            .last_compute_ms
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AtomicI64::new(0)))
            .clone();

        let last = cell.load(Ordering::Acquire);
        let should_recompute =
            force || last == 0 || now - last >= MIN_COMPUTE_INTERVAL_MS || burst;

        if !should_recompute {
            return None;
        }

        if cell
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Some(tokio::spawn(self.spawn_compute(key, buffer)))
        } else {
            None
        }
    }

    /// Build the compute future for `key`. Bounded by `compute_permits` so
    /// the number of concurrently-running compute tasks stays capped.
    fn spawn_compute(
        &self,
        key: AggregationKey,
        buffer: Arc<SegQueue<BufferedEvent>>,
    ) -> impl std::future::Future<Output = ()> + 'static {
        let digests = self.digests.clone();
        let cache = self.cache.clone();
        let upstream_services = self.upstream_services.clone();
        let buffers = self.buffers.clone();
        let last_compute_ms = self.last_compute_ms.clone();
        let permits = self.compute_permits.clone();
        let window_seconds = self.window_seconds;

        async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            compute_key(
                &key,
                &buffer,
                &digests,
                &cache,
                &upstream_services,
                &buffers,
                &last_compute_ms,
                window_seconds,
            )
            .await;
        }
    }
}

/// The compute task body for one key (§4.5 "Compute task for key k").
/// Errors along the way (cache write failure, digest lookup) are logged and
/// swallowed — a single key's failure must never affect the sweeper or
/// other keys (§7 propagation rule).
#[allow(clippy::too_many_arguments)]
async fn compute_key(
    key: &AggregationKey,
    buffer: &SegQueue<BufferedEvent>,
    digests: &DigestRegistry,
    cache: &MetricCache,
    upstream_services: &DashMap<AggregationKey, String>,
    buffers: &DashMap<AggregationKey, Arc<SegQueue<BufferedEvent>>>,
    last_compute_ms: &DashMap<AggregationKey, Arc<AtomicI64>>,
    window_seconds: i64,
) {
    let now = Utc::now().timestamp_millis();
    let window_start_ms = now - window_seconds * 1000;
    let aging_cutoff_ms = now - (window_seconds + WINDOW_GRACE_SECONDS) * 1000;

    // SegQueue has no retain/iterate API: drain the whole buffer in one
    // pass, partitioning into "survives aging" and "inside the window",
    // then push survivors back rather than copying the buffer up front.
    let mut survivors = Vec::new();
    let mut windowed = Vec::new();
    while let Some(event) = buffer.pop() {
        if event.timestamp_ms >= aging_cutoff_ms {
            survivors.push(event);
        }
        if event.timestamp_ms > window_start_ms {
            windowed.push(event);
        }
    }
    for event in &survivors {
        buffer.push(*event);
    }

    if windowed.is_empty() {
        if survivors.is_empty() {
            retire_key(key, digests, upstream_services, buffers, last_compute_ms);
        }
        return;
    }

    let request_count = windowed.len() as u64;
    let error_count = windowed.iter().filter(|e| e.status_code >= 400).count() as u64;
    let success_count = request_count - error_count;
    let error_rate = 100.0 * error_count as f64 / request_count as f64;
    let min_latency_ms = windowed.iter().map(|e| e.latency_ms).min().unwrap_or(0);
    let max_latency_ms = windowed.iter().map(|e| e.latency_ms).max().unwrap_or(0);

    let (p50, p90, p99) = match digests.percentiles(key).await {
        Some(p) => p,
        None => {
            let mut sorted: Vec<u64> = windowed.iter().map(|e| e.latency_ms).collect();
            sorted.sort_unstable();
            (
                percentile_from_sorted_samples(&sorted, 0.50),
                percentile_from_sorted_samples(&sorted, 0.90),
                percentile_from_sorted_samples(&sorted, 0.99),
            )
        }
    };

    let earliest_ms = windowed.iter().map(|e| e.timestamp_ms).min().unwrap_or(now);
    let latest_ms = windowed.iter().map(|e| e.timestamp_ms).max().unwrap_or(now);
    let span_ms = latest_ms - earliest_ms;

    let rps = if span_ms >= 1_000 {
        request_count as f64 / (span_ms as f64 / 1_000.0)
    } else if span_ms > 0 {
        let instant_rps = request_count as f64 / (span_ms as f64 / 1_000.0);
        let window_rps = request_count as f64 / window_seconds as f64;
        instant_rps.max(window_rps)
    } else {
        request_count as f64 / window_seconds as f64
    };

    let upstream_service = upstream_services
        .get(key)
        .map(|v| v.clone())
        .unwrap_or_default();

    let aggregate = WindowAggregate {
        endpoint: key.path.clone(),
        method: key.method.clone(),
        window_start: ms_to_datetime(window_start_ms),
        window_end: ms_to_datetime(now),
        request_count,
        rps,
        p50_latency_ms: p50,
        p90_latency_ms: p90,
        p99_latency_ms: p99,
        min_latency_ms,
        max_latency_ms,
        error_rate,
        error_count,
        success_count,
        upstream_service,
    };

    if let Err(e) = cache.put(key, &aggregate).await {
        warn!(error = %e, key = %key, "failed to write aggregate to metric cache");
    }

    if survivors.is_empty() {
        retire_key(key, digests, upstream_services, buffers, last_compute_ms);
    }
}

/// Transition a key from Active to Dormant: drop its digest and remove it
/// from every per-key map. Re-entry to Active on the next ingested event is
/// transparent since `get_or_create_buffer` lazily recreates the entry.
fn retire_key(
    key: &AggregationKey,
    digests: &DigestRegistry,
    upstream_services: &DashMap<AggregationKey, String>,
    buffers: &DashMap<AggregationKey, Arc<SegQueue<BufferedEvent>>>,
    last_compute_ms: &DashMap<AggregationKey, Arc<AtomicI64>>,
) {
    digests.drop_key(key);
    buffers.remove(key);
    last_compute_ms.remove(key);
    upstream_services.remove(key);
}

fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, status: u16, latency_ms: u64) -> TelemetryRecord {
        TelemetryRecord {
            request_id: uuid::Uuid::new_v4().to_string(),
            path: path.to_owned(),
            method: "GET".to_owned(),
            status_code: status,
            latency_ms,
            client_id: "client".to_owned(),
            api_key: String::new(),
            upstream_service: "users".to_owned(),
            route_id: "users-route".to_owned(),
            timestamp: Utc::now(),
            error_type: None,
            user_agent: None,
            ip_address: None,
        }
    }

    #[tokio::test]
    async fn ingest_creates_buffer_and_digest_for_new_key() {
        let redis = fred::prelude::RedisClient::new(
            fred::prelude::RedisConfig::from_url("redis://127.0.0.1:6379").unwrap(),
            None,
            None,
            None,
        );
        let engine = Engine::new(MetricCache::new(redis), 60);
        let key = AggregationKey::new("/api/users", "GET");

        engine.ingest(&record("/api/users", 200, 42)).await;

        assert!(engine.buffers.contains_key(&key));
        assert!(engine.digests().contains(&key));
    }

    #[test]
    fn retire_key_removes_all_per_key_state() {
        let buffers = DashMap::new();
        let last_compute_ms = DashMap::new();
        let upstream_services = DashMap::new();
        let digests = DigestRegistry::new();
        let key = AggregationKey::new("/api/users", "GET");

        buffers.insert(key.clone(), Arc::new(SegQueue::new()));
        last_compute_ms.insert(key.clone(), Arc::new(AtomicI64::new(1)));
        upstream_services.insert(key.clone(), "users".to_owned());

        retire_key(&key, &digests, &upstream_services, &buffers, &last_compute_ms);

        assert!(!buffers.contains_key(&key));
        assert!(!last_compute_ms.contains_key(&key));
        assert!(!upstream_services.contains_key(&key));
    }
}
