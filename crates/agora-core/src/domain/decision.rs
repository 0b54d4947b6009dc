use std::time::Duration;

use super::limits::EndpointLimit;

/// Outcome of one admission check. Ephemeral, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Counter value for the current window after this request.
    pub current_count: u64,
    pub reset_in: Duration,
    /// Limit the request was checked against (after adaptive scaling).
    pub limit: EndpointLimit,
    /// Set when the store was unreachable and the request was let through.
    pub degraded: bool,
}

impl RateLimitDecision {
    /// Fail-open decision used when the counter store cannot be reached.
    pub fn fail_open(nominal: EndpointLimit) -> Self {
        Self {
            allowed: true,
            current_count: 0,
            reset_in: Duration::ZERO,
            limit: nominal,
            degraded: true,
        }
    }

    /// `limit - count`, floored at zero.
    pub fn remaining(&self) -> u64 {
        self.limit.requests.saturating_sub(self.current_count)
    }

    /// Seconds a rejected client should wait, at least one.
    pub fn retry_after_secs(&self) -> u64 {
        self.reset_in.as_secs_f64().ceil().max(1.0) as u64
    }
}

/// Read-only snapshot of a window counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUsage {
    pub count: u64,
    pub limit: EndpointLimit,
    pub reset_in: Duration,
}

impl WindowUsage {
    pub fn remaining(&self) -> u64 {
        self.limit.requests.saturating_sub(self.count)
    }
}
