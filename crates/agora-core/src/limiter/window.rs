//! Fixed-window counter engine.
//!
//! Windows are aligned to multiples of their length since the Unix epoch, so
//! a client can see up to twice the nominal rate across a boundary. Counters
//! expire on their own and are never deleted.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::{EndpointLimit, RateLimitDecision, WindowUsage};
use crate::error::StoreError;
use crate::ports::{Clock, CounterStore};

/// Prefix of every window counter key.
pub const KEY_PREFIX: &str = "ratelimit";

#[derive(Debug, Clone, Copy)]
struct WindowBounds {
    start_secs: i64,
    /// Time left until the next window starts.
    until_reset: Duration,
}

impl WindowBounds {
    fn at(now: DateTime<Utc>, window: Duration) -> Self {
        let window_ms = (window.as_millis() as i64).max(1);
        let now_ms = now.timestamp_millis();
        let start_ms = now_ms.div_euclid(window_ms) * window_ms;
        Self {
            start_secs: start_ms.div_euclid(1000),
            until_reset: Duration::from_millis((start_ms + window_ms - now_ms) as u64),
        }
    }
}

/// Atomic check-and-increment over fixed windows in a [`CounterStore`].
#[derive(Clone)]
pub struct WindowCounter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl WindowCounter {
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// `ratelimit:<key>:<windowStartEpochSecs>` for the window containing now.
    pub fn storage_key(&self, key: &str, window: Duration) -> String {
        let bounds = WindowBounds::at(self.clock.now(), window);
        format!("{KEY_PREFIX}:{key}:{}", bounds.start_secs)
    }

    /// Admit and count the request if the window is below `limit.requests`.
    ///
    /// Requests past the cap are not counted. The read and the increment are a
    /// single store operation, so concurrent callers cannot both be admitted on
    /// the same pre-increment count.
    pub async fn check_and_increment(
        &self,
        key: &str,
        limit: EndpointLimit,
    ) -> Result<RateLimitDecision, StoreError> {
        let bounds = WindowBounds::at(self.clock.now(), limit.window);
        let storage_key = format!("{KEY_PREFIX}:{key}:{}", bounds.start_secs);

        let hit = self
            .store
            .increment_below(&storage_key, limit.requests, limit.window)
            .await?;

        if !hit.admitted {
            tracing::debug!(key = %storage_key, count = hit.count, "Window limit reached");
            return Ok(RateLimitDecision {
                allowed: false,
                current_count: hit.count,
                reset_in: hit.ttl.unwrap_or(bounds.until_reset),
                limit,
                degraded: false,
            });
        }

        Ok(RateLimitDecision {
            allowed: true,
            current_count: hit.count,
            reset_in: limit.window,
            limit,
            degraded: false,
        })
    }

    /// Current window count without counting a request.
    pub async fn usage(&self, key: &str, limit: EndpointLimit) -> Result<WindowUsage, StoreError> {
        let storage_key = self.storage_key(key, limit.window);
        let count = self.store.get(&storage_key).await?.unwrap_or(0).max(0) as u64;
        let ttl = self.store.ttl(&storage_key).await?;

        Ok(WindowUsage {
            count,
            limit,
            reset_in: ttl.unwrap_or(limit.window),
        })
    }
}
