//! Telemetry emitter (C7): non-blocking fan-in, batched fire-and-forget POST
//! to the analytics service.
//!
//! Grounded on `webhooks::delivery::spawn_delivery_worker`'s retry/backoff
//! array for the flush-with-retry logic, and on
//! `observability::ingestion::spawn_ingestion_workers`'s bounded channel +
//! batch-then-flush worker loop for the queue/batching shape. A single
//! background drain worker is sufficient here (unlike C2's multi-worker
//! pool, which needs a genuinely shared queue — see `analytics::sink`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gateway_analytics_common::TelemetryRecord;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::warn;

/// Retry backoff schedule for a batch flush (§4.2: 3 attempts, starting 200ms).
const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_millis(200),
    Duration::from_millis(400),
    Duration::from_millis(800),
];

/// Log a drop-rate warning every this many drops (§4.2: "every N drops").
const DROP_LOG_INTERVAL: u64 = 100;

#[derive(Debug, Default)]
pub struct EmitterMetrics {
    pub dropped: AtomicU64,
    pub flushed_batches: AtomicU64,
    pub flush_failures: AtomicU64,
}

#[derive(Clone)]
pub struct TelemetryEmitter {
    tx: mpsc::Sender<TelemetryRecord>,
    metrics: Arc<EmitterMetrics>,
}

impl TelemetryEmitter {
    /// Spawn the emitter: returns the handle used by request handlers plus
    /// the background worker's join handle (used at shutdown).
    pub fn spawn(
        analytics_url: String,
        queue_capacity: usize,
        batch_size: usize,
        flush_interval: Duration,
        http_client: reqwest::Client,
    ) -> (Self, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let metrics = Arc::new(EmitterMetrics::default());
        let worker_metrics = metrics.clone();
        let handle = tokio::spawn(drain_loop(
            rx,
            analytics_url,
            batch_size,
            flush_interval,
            http_client,
            worker_metrics,
        ));
        (Self { tx, metrics }, handle)
    }

    /// Non-blocking enqueue. Never blocks the calling request's task: on a
    /// full queue the record is dropped and counted (§4.2/§7
    /// `TelemetryDropped`), never surfaced to the client.
    pub fn emit(&self, record: TelemetryRecord) {
        if self.tx.try_send(record).is_err() {
            let dropped = self.metrics.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped % DROP_LOG_INTERVAL == 0 {
                warn!(total_dropped = dropped, "telemetry emitter queue full, dropping records");
            }
        }
    }

    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.metrics.dropped.load(Ordering::Relaxed)
    }
}

async fn drain_loop(
    mut rx: mpsc::Receiver<TelemetryRecord>,
    analytics_url: String,
    batch_size: usize,
    flush_interval: Duration,
    http_client: reqwest::Client,
    metrics: Arc<EmitterMetrics>,
) {
    let ingest_url = format!(
        "{}/api/v1/telemetry/ingest/batch",
        analytics_url.trim_end_matches('/')
    );
    let mut batch: Vec<TelemetryRecord> = Vec::with_capacity(batch_size);
    let mut last_flush = Instant::now();

    loop {
        let remaining = flush_interval.saturating_sub(last_flush.elapsed());
        match tokio::time::timeout(remaining.max(Duration::from_millis(1)), rx.recv()).await {
            Ok(Some(record)) => {
                batch.push(record);
                if batch.len() >= batch_size {
                    flush(&http_client, &ingest_url, &mut batch, &metrics).await;
                    last_flush = Instant::now();
                }
            }
            Ok(None) => {
                // Channel closed: drain whatever is left and do one final flush.
                if !batch.is_empty() {
                    flush(&http_client, &ingest_url, &mut batch, &metrics).await;
                }
                break;
            }
            Err(_timeout) => {
                if !batch.is_empty() {
                    flush(&http_client, &ingest_url, &mut batch, &metrics).await;
                }
                last_flush = Instant::now();
            }
        }
    }
}

async fn flush(
    client: &reqwest::Client,
    url: &str,
    batch: &mut Vec<TelemetryRecord>,
    metrics: &EmitterMetrics,
) {
    if batch.is_empty() {
        return;
    }

    for (attempt, delay) in std::iter::once(Duration::ZERO).chain(RETRY_DELAYS).enumerate() {
        if attempt > 0 {
            tokio::time::sleep(delay).await;
        }
        match client.post(url).json(batch.as_slice()).send().await {
            Ok(resp) if resp.status().is_client_error() => {
                // §4.2: retries are only for transient (non-4xx) errors.
                warn!(status = %resp.status(), "analytics rejected telemetry batch, not retrying");
                metrics.flush_failures.fetch_add(1, Ordering::Relaxed);
                batch.clear();
                return;
            }
            Ok(resp) if resp.status().is_success() => {
                metrics.flushed_batches.fetch_add(1, Ordering::Relaxed);
                batch.clear();
                return;
            }
            Ok(resp) => {
                warn!(status = %resp.status(), attempt, "transient error flushing telemetry batch");
            }
            Err(e) => {
                warn!(error = %e, attempt, "failed to flush telemetry batch");
            }
        }
    }

    warn!(batch_size = batch.len(), "telemetry batch flush retries exhausted, dropping batch");
    metrics.flush_failures.fetch_add(1, Ordering::Relaxed);
    batch.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delays_start_at_200ms_and_double() {
        assert_eq!(RETRY_DELAYS[0], Duration::from_millis(200));
        assert_eq!(RETRY_DELAYS[1], Duration::from_millis(400));
        assert_eq!(RETRY_DELAYS[2], Duration::from_millis(800));
    }
}
