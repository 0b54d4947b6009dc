//! The limiter: fixed-window counters, behavior scores, adaptive quotas and
//! the fail-open decision facade composing them.

mod adaptive;
mod behavior;
mod facade;
mod window;

pub use adaptive::{SUSPICIOUS_BELOW, TRUSTED_ABOVE, apply_reputation};
pub use behavior::{
    BAD_OUTCOME_DELTA, BehaviorLedger, DEFAULT_SCORE, GOOD_OUTCOME_DELTA, MAX_SCORE, MIN_SCORE,
    SCORE_TTL,
};
pub use facade::{AdaptiveRateLimiter, DEFAULT_STORE_TIMEOUT};
pub use window::WindowCounter;
