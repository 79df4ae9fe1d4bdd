//! Rate-limit error/outcome types (§4.1 step 2, §7 `RateLimitExceeded`).

/// Outcome of a rate-limit check. Unlike auth/routing this never short-circuits
/// the filter chain on its own — §4.1 requires the chain to continue to
/// telemetry capture even when the limit is exceeded.
#[derive(Debug, Clone)]
pub enum RateLimitOutcome {
    Allowed { limit: u32, remaining: u32 },
    Exceeded { limit: u32 },
    /// The counter store errored; per §4.1/§7 the gateway fails open.
    FailedOpen,
}

impl RateLimitOutcome {
    #[must_use]
    pub const fn is_exceeded(&self) -> bool {
        matches!(self, Self::Exceeded { .. })
    }
}
