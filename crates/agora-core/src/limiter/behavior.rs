//! Behavior score ledger - a bounded reputation per identifier.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::Identifier;
use crate::error::StoreError;
use crate::ports::{CounterStore, ScoreUpdate};

pub const DEFAULT_SCORE: i64 = 100;
pub const MIN_SCORE: i64 = 0;
pub const MAX_SCORE: i64 = 200;
/// Applied for an admitted request.
pub const GOOD_OUTCOME_DELTA: i64 = 1;
/// Applied for a request rejected for quota. Penalties outweigh rewards so
/// reputation recovers slowly after abuse.
pub const BAD_OUTCOME_DELTA: i64 = -2;
/// Idle identifiers revert to [`DEFAULT_SCORE`] after this long.
pub const SCORE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const KEY_PREFIX: &str = "behavior";

/// Reads and adjusts `behavior:<identifier>` records.
#[derive(Clone)]
pub struct BehaviorLedger {
    store: Arc<dyn CounterStore>,
}

impl BehaviorLedger {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    fn key(identifier: &Identifier) -> String {
        format!("{KEY_PREFIX}:{identifier}")
    }

    /// Persisted score, or [`DEFAULT_SCORE`] when absent or expired.
    pub async fn read_score(&self, identifier: &Identifier) -> Result<i64, StoreError> {
        let score = self.store.get(&Self::key(identifier)).await?;
        Ok(score
            .map(|s| s.clamp(MIN_SCORE, MAX_SCORE))
            .unwrap_or(DEFAULT_SCORE))
    }

    /// Apply one request outcome and return the new score, always in
    /// `[MIN_SCORE, MAX_SCORE]`. The write refreshes the 24h expiry.
    pub async fn record_outcome(
        &self,
        identifier: &Identifier,
        good: bool,
    ) -> Result<i64, StoreError> {
        let delta = if good {
            GOOD_OUTCOME_DELTA
        } else {
            BAD_OUTCOME_DELTA
        };

        let score = self
            .store
            .add_clamped(
                &Self::key(identifier),
                ScoreUpdate {
                    delta,
                    default: DEFAULT_SCORE,
                    min: MIN_SCORE,
                    max: MAX_SCORE,
                    ttl: SCORE_TTL,
                },
            )
            .await?;

        tracing::trace!(identifier = %identifier, good, score, "Behavior score updated");
        Ok(score)
    }
}
