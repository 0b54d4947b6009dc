//! Decision facade: reputation lookup, adaptive quota, window check, and the
//! fail-open policy for store outages.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{EndpointLimit, Identifier, RateLimitDecision, WindowUsage};
use crate::error::StoreError;
use crate::ports::{Clock, CounterStore, SystemClock};

use super::adaptive::apply_reputation;
use super::behavior::BehaviorLedger;
use super::window::WindowCounter;

/// Upper bound on a single store round trip.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(250);

/// The limiter's single entry point for the request layer.
///
/// Store errors and timeouts never escape [`check_adaptive`](Self::check_adaptive)
/// or [`check`](Self::check): the request is admitted and the decision is
/// marked degraded. An increment that reached the store stays counted even if
/// the caller's request is later cancelled.
#[derive(Clone)]
pub struct AdaptiveRateLimiter {
    store: Arc<dyn CounterStore>,
    counter: WindowCounter,
    ledger: BehaviorLedger,
    store_timeout: Duration,
}

impl AdaptiveRateLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            counter: WindowCounter::new(store.clone(), clock),
            ledger: BehaviorLedger::new(store.clone()),
            store,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.store_timeout, call)
            .await
            .map_err(|_| StoreError::Timeout(self.store_timeout))?
    }

    /// Reputation-scaled admission check for `identifier` on `endpoint_key`.
    pub async fn check_adaptive(
        &self,
        identifier: &Identifier,
        endpoint_key: &str,
        base: EndpointLimit,
    ) -> RateLimitDecision {
        let key = identifier.scoped(endpoint_key);
        let outcome = async {
            let score = self.bounded(self.ledger.read_score(identifier)).await?;
            let effective = apply_reputation(base, score);
            if effective != base {
                tracing::debug!(
                    identifier = %identifier,
                    score,
                    requests = effective.requests,
                    window_secs = effective.window.as_secs(),
                    "Adjusted limit by reputation"
                );
            }
            self.bounded(self.counter.check_and_increment(&key, effective))
                .await
        }
        .await;

        self.settle(&key, base, outcome)
    }

    /// Admission check against `base` as configured, ignoring reputation.
    pub async fn check(
        &self,
        identifier: &Identifier,
        endpoint_key: &str,
        base: EndpointLimit,
    ) -> RateLimitDecision {
        let key = identifier.scoped(endpoint_key);
        let outcome = self
            .bounded(self.counter.check_and_increment(&key, base))
            .await;
        self.settle(&key, base, outcome)
    }

    fn settle(
        &self,
        key: &str,
        base: EndpointLimit,
        outcome: Result<RateLimitDecision, StoreError>,
    ) -> RateLimitDecision {
        match outcome {
            Ok(decision) => {
                if !decision.allowed {
                    tracing::debug!(
                        key = %key,
                        count = decision.current_count,
                        limit = decision.limit.requests,
                        "Rate limit exceeded"
                    );
                }
                decision
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Counter store unavailable, failing open");
                RateLimitDecision::fail_open(base)
            }
        }
    }

    /// Feed a request outcome into the identifier's reputation. Store errors
    /// are logged and dropped.
    pub async fn record_outcome(&self, identifier: &Identifier, good: bool) {
        if let Err(e) = self
            .bounded(self.ledger.record_outcome(identifier, good))
            .await
        {
            tracing::warn!(identifier = %identifier, error = %e, "Failed to record behavior");
        }
    }

    /// Current reputation of `identifier`.
    pub async fn score(&self, identifier: &Identifier) -> Result<i64, StoreError> {
        self.bounded(self.ledger.read_score(identifier)).await
    }

    /// Current window usage for `identifier` on `endpoint_key`, without
    /// counting a request.
    pub async fn usage(
        &self,
        identifier: &Identifier,
        endpoint_key: &str,
        limit: EndpointLimit,
    ) -> Result<WindowUsage, StoreError> {
        let key = identifier.scoped(endpoint_key);
        self.bounded(self.counter.usage(&key, limit)).await
    }

    /// Store reachability, for health checks.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.bounded(self.store.ping()).await
    }
}
