//! # Agora Infrastructure
//!
//! Concrete implementations of the ports defined in `agora-core`.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - In-memory counter store only
//! - `auth` - JWT bearer token validation
//! - `redis` - Redis-backed counter store

pub mod store;

#[cfg(feature = "auth")]
pub mod auth;

pub use store::InMemoryCounterStore;

#[cfg(feature = "auth")]
pub use auth::{JwtConfig, JwtTokenService};

#[cfg(feature = "redis")]
pub use store::{RedisConfig, RedisCounterStore};
