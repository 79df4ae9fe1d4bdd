//! The per-key event buffer's element type and the tunables from §4.5.

/// Minimum interval between recomputes for a key absent a burst (ms).
pub const MIN_COMPUTE_INTERVAL_MS: i64 = 100;
/// Buffer size that forces an immediate recompute regardless of interval.
pub const BURST_THRESHOLD: usize = 5;
/// Extra seconds past the window a record survives before aging out.
pub const WINDOW_GRACE_SECONDS: i64 = 10;

/// One observation in a key's event buffer. Deliberately copy-cheap: the
/// compute task drains the whole `SegQueue` on every pass, so this gets
/// cloned at least once per recompute.
#[derive(Debug, Clone, Copy)]
pub struct BufferedEvent {
    pub timestamp_ms: i64,
    pub latency_ms: u64,
    pub status_code: u16,
}
