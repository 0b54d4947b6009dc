//! Data Transfer Objects - response types for the operational endpoints.

use serde::{Deserialize, Serialize};

/// Reachability of the counter store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreStatus {
    Healthy,
    Unhealthy,
    NotConfigured,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` or `degraded`.
    pub status: String,
    pub store: StoreStatus,
    pub version: String,
    pub timestamp: String,
}

/// Query of the admin limiter inspection route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitStatusQuery {
    /// `user:<id>` or `ip:<address>`.
    pub identifier: String,
    /// Request path; resolved to its endpoint rule.
    pub path: String,
}

/// Window usage and reputation of one identifier on one endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitStatusResponse {
    pub identifier: String,
    pub endpoint: String,
    pub limit: u64,
    pub window_secs: u64,
    pub burst: u64,
    pub count: u64,
    pub remaining: u64,
    pub reset_in_secs: u64,
    pub behavior_score: i64,
}
