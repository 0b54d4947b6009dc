//! Reputation-scaled quotas.

use crate::domain::EndpointLimit;

/// Scores below this halve the quota and double the window.
pub const SUSPICIOUS_BELOW: i64 = 50;
/// Scores above this raise the quota by a quarter.
pub const TRUSTED_ABOVE: i64 = 150;

/// Scale `base` by reputation. Pure, recomputed on every request.
///
/// The +25% raise rounds half up: `(requests * 5 + 2) / 4`, so 10 becomes 13.
/// Halving never goes below one request.
pub fn apply_reputation(base: EndpointLimit, score: i64) -> EndpointLimit {
    if score < SUSPICIOUS_BELOW {
        EndpointLimit {
            requests: (base.requests / 2).max(1),
            window: base.window.saturating_mul(2),
            ..base
        }
    } else if score > TRUSTED_ABOVE {
        EndpointLimit {
            requests: base.requests.saturating_mul(5).saturating_add(2) / 4,
            ..base
        }
    } else {
        base
    }
}
