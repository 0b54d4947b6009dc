//! Shared fixtures for handler and middleware tests.

use std::sync::Arc;
use std::time::Duration;

use agora_core::domain::{EndpointLimits, EndpointRule};
use agora_core::ports::{CounterStore, ManualClock, ScoreUpdate, WindowHit};
use agora_core::{AdaptiveRateLimiter, StoreError};
use agora_infra::{InMemoryCounterStore, JwtConfig, JwtTokenService};
use async_trait::async_trait;

use crate::state::AppState;

/// Store that refuses every call.
pub struct FailingStore;

fn refused() -> StoreError {
    StoreError::Connection("connection refused".to_string())
}

#[async_trait]
impl CounterStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<i64>, StoreError> {
        Err(refused())
    }

    async fn ttl(&self, _key: &str) -> Result<Option<Duration>, StoreError> {
        Err(refused())
    }

    async fn increment_below(
        &self,
        _key: &str,
        _cap: u64,
        _ttl: Duration,
    ) -> Result<WindowHit, StoreError> {
        Err(refused())
    }

    async fn add_clamped(&self, _key: &str, _update: ScoreUpdate) -> Result<i64, StoreError> {
        Err(refused())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(refused())
    }
}

pub fn tokens() -> Arc<JwtTokenService> {
    Arc::new(JwtTokenService::new(JwtConfig {
        secret: "api-server-test".to_string(),
        ..JwtConfig::default()
    }))
}

/// In-memory limiter on a frozen clock, so tests never straddle a window edge.
pub fn memory_limiter() -> AdaptiveRateLimiter {
    let clock = Arc::new(ManualClock::at_epoch_secs(1_700_000_040));
    let store = Arc::new(InMemoryCounterStore::with_clock(clock.clone()));
    AdaptiveRateLimiter::with_clock(store, clock)
}

pub fn failing_limiter() -> AdaptiveRateLimiter {
    AdaptiveRateLimiter::new(Arc::new(FailingStore))
}

/// Two likes per minute; everything else on the default limit.
pub fn limits() -> EndpointLimits {
    EndpointLimits::new(vec![EndpointRule::new("/api/v1/posts/{id}/like", 2, 60, 0)])
        .unwrap()
}

pub fn state(limiter: Option<AdaptiveRateLimiter>) -> AppState {
    AppState {
        limiter,
        limits: Arc::new(limits()),
        tokens: tokens(),
        rate_limit_enabled: true,
        adaptive: true,
    }
}
