//! Error types shared by the limiter and its adapters.

use std::time::Duration;

use thiserror::Error;

/// Counter store failures. The decision facade recovers from every variant.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store connection failed: {0}")]
    Connection(String),

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store operation failed: {0}")]
    Operation(String),
}

/// Malformed endpoint-limit configuration. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read rate limit rules: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse rate limit rules: {0}")]
    Parse(String),

    #[error("Invalid rate limit rule for '{path}': {reason}")]
    InvalidRule { path: String, reason: String },

    #[error("Duplicate rate limit rule: {0}")]
    DuplicateRule(String),
}
