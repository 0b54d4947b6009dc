//! Shared counter store port.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StoreError;

/// Outcome of a single atomic check-and-increment against a window counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHit {
    /// Whether the counter was below the cap and got incremented.
    pub admitted: bool,
    /// Counter value after the call (unchanged when not admitted).
    pub count: u64,
    /// Remaining time to live of the counter key, if the store reports one.
    pub ttl: Option<Duration>,
}

/// Parameters for an atomic clamped score adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreUpdate {
    pub delta: i64,
    /// Value assumed when the key is absent or expired.
    pub default: i64,
    pub min: i64,
    pub max: i64,
    /// Expiry set (and refreshed) on every write.
    pub ttl: Duration,
}

/// Key-value store with atomic counters and expiry (Redis, in-memory).
///
/// Implementations must serialize concurrent updates to the same key: two
/// callers of [`CounterStore::increment_below`] on one key never both observe
/// the same pre-increment count.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read an integer value. `None` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError>;

    /// Remaining time to live of a key. `None` when absent or without expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// Atomically: read the counter (0 if absent); when it is below `cap`,
    /// increment it and set `ttl` on the first write. At or above `cap` the
    /// counter is left untouched.
    async fn increment_below(
        &self,
        key: &str,
        cap: u64,
        ttl: Duration,
    ) -> Result<WindowHit, StoreError>;

    /// Atomically add `update.delta` to the stored value (or `update.default`),
    /// clamp to `[min, max]`, write it back with `update.ttl` and return it.
    async fn add_clamped(&self, key: &str, update: ScoreUpdate) -> Result<i64, StoreError>;

    /// Reachability check.
    async fn ping(&self) -> Result<(), StoreError>;
}
