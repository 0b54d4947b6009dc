//! # Agora Core
//!
//! The domain layer of the Agora rate limiter.
//! This crate holds the limiter algorithms and the ports they run against;
//! every piece of I/O goes through a trait implemented in `agora-infra`.

pub mod domain;
pub mod error;
pub mod limiter;
pub mod ports;

#[cfg(test)]
mod test_support;

pub use error::{ConfigError, StoreError};
pub use limiter::AdaptiveRateLimiter;
