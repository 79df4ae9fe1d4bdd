//! Rate-limit filter (§4.1 step 2, C1).

mod error;
mod limiter;

pub use error::RateLimitOutcome;
pub use limiter::RateLimiter;
