//! Raw-event sink (C2).
//!
//! Grounded on `observability::ingestion::spawn_ingestion_workers`'s
//! accumulate-then-flush batch shape, generalized from its single-consumer
//! `mpsc` channel to a genuinely shared multi-consumer queue: a fixed pool
//! of worker tasks all popping from one `crossbeam_queue::ArrayQueue`
//! (`mpsc` has exactly one `Receiver`, so it can't back 8 independent
//! workers draining one bounded queue), woken via `tokio::sync::Notify`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_queue::ArrayQueue;
use gateway_analytics_common::TelemetryRecord;
use sqlx::PgPool;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::db;

const POLL_TIMEOUT: Duration = Duration::from_millis(50);
const DROP_LOG_INTERVAL: u64 = 1_000;

#[derive(Default)]
pub struct SinkMetrics {
    pub dropped: AtomicU64,
    pub persisted: AtomicU64,
    pub duplicates_skipped: AtomicU64,
}

pub struct RawSink {
    queue: ArrayQueue<TelemetryRecord>,
    notify: Notify,
    metrics: SinkMetrics,
    shutdown: AtomicBool,
}

impl RawSink {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            notify: Notify::new(),
            metrics: SinkMetrics::default(),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Non-blocking enqueue. On refusal (queue full), counts the drop and
    /// logs a warning every [`DROP_LOG_INTERVAL`] drops (§4.4/§7:
    /// `IngestDropped`).
    pub fn enqueue(&self, record: TelemetryRecord) {
        if self.queue.push(record).is_err() {
            let dropped = self.metrics.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped % DROP_LOG_INTERVAL == 0 {
                warn!(dropped, "raw sink queue full, dropping records");
            }
            return;
        }
        self.notify.notify_one();
    }

    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.metrics.dropped.load(Ordering::Relaxed)
    }

    /// Signal every worker to stop accepting new poll cycles, drain
    /// whatever remains in the queue, flush it once, and exit (§4.4/§5:
    /// "drain raw sink ... pools, 10s ... joins"). Wakes any worker
    /// currently parked on an empty queue so the drain happens immediately
    /// rather than waiting out the next poll timeout.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

/// Spawn the fixed-size worker pool (default 8) that drains `sink` and
/// batch-writes to `pool`.
pub fn spawn_workers(
    sink: Arc<RawSink>,
    pool: PgPool,
    worker_count: usize,
    batch_size: usize,
    flush_interval: Duration,
) -> Vec<JoinHandle<()>> {
    (0..worker_count)
        .map(|worker_id| {
            let sink = sink.clone();
            let pool = pool.clone();
            tokio::spawn(worker_loop(worker_id, sink, pool, batch_size, flush_interval))
        })
        .collect()
}

async fn worker_loop(
    worker_id: usize,
    sink: Arc<RawSink>,
    pool: PgPool,
    batch_size: usize,
    flush_interval: Duration,
) {
    let mut batch: Vec<TelemetryRecord> = Vec::with_capacity(batch_size);
    let mut last_flush = Instant::now();

    loop {
        let _ = tokio::time::timeout(POLL_TIMEOUT, sink.notify.notified()).await;

        while batch.len() < batch_size {
            match sink.queue.pop() {
                Some(record) => batch.push(record),
                None => break,
            }
        }

        let should_flush =
            !batch.is_empty() && (batch.len() >= batch_size || last_flush.elapsed() >= flush_interval);

        if should_flush {
            flush(&pool, &mut batch, &sink.metrics).await;
            last_flush = Instant::now();
            debug!(worker_id, "raw sink worker flushed batch");
        }

        if sink.is_shutdown() {
            // Final drain: pop whatever is left behind and flush it once
            // more before exiting, per §4.4's shutdown rule.
            while let Some(record) = sink.queue.pop() {
                batch.push(record);
            }
            if !batch.is_empty() {
                flush(&pool, &mut batch, &sink.metrics).await;
            }
            debug!(worker_id, "raw sink worker drained and exiting on shutdown");
            break;
        }
    }
}

/// One batched insert per flush (§4.4's writer policy). Falls back to
/// per-record inserts only if the whole batch fails; a persisting
/// connectivity failure mid-fallback drops the remainder rather than
/// retrying forever.
async fn flush(pool: &PgPool, batch: &mut Vec<TelemetryRecord>, metrics: &SinkMetrics) {
    if batch.is_empty() {
        return;
    }

    if let Err(e) = db::insert_batch(pool, batch).await {
        warn!(error = %e, batch_size = batch.len(), "batch insert failed, falling back to per-record inserts");

        let mut storage_unavailable = false;
        for record in batch.iter() {
            if storage_unavailable {
                metrics.dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            match db::insert_one(pool, record).await {
                Ok(()) => {
                    metrics.persisted.fetch_add(1, Ordering::Relaxed);
                }
                Err(e2) if is_connectivity_error(&e2) => {
                    storage_unavailable = true;
                    metrics.dropped.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    // Constraint/uniqueness conflict: counted as a silently
                    // skipped duplicate, per §4.4.
                    metrics.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    } else {
        metrics
            .persisted
            .fetch_add(batch.len() as u64, Ordering::Relaxed);
    }

    batch.clear();
}

fn is_connectivity_error(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record() -> TelemetryRecord {
        TelemetryRecord {
            request_id: uuid::Uuid::new_v4().to_string(),
            path: "/api/users".to_owned(),
            method: "GET".to_owned(),
            status_code: 200,
            latency_ms: 10,
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

    #[test]
    fn enqueue_past_capacity_is_counted_as_dropped() {
        let sink = RawSink::new(2);
        sink.enqueue(record());
        sink.enqueue(record());
        sink.enqueue(record());
        assert_eq!(sink.dropped_count(), 1);
    }
}
