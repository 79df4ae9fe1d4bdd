//! Internal-only: never surfaced to a client, per §7's `CacheUnavailable`
//! rule — callers log and fall back to an empty result.

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("metric cache store error: {0}")]
    Store(fred::error::RedisError),
    #[error("metric cache serialization error: {0}")]
    Serialize(serde_json::Error),
}
