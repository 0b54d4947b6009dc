//! Application state - shared across all handlers.

use std::sync::Arc;
use std::time::Duration;

use agora_core::domain::EndpointLimits;
use agora_core::ports::{CounterStore, TokenService};
use agora_core::{AdaptiveRateLimiter, ConfigError};
use agora_infra::{InMemoryCounterStore, JwtTokenService};

#[cfg(feature = "redis")]
use agora_infra::RedisCounterStore;

use crate::config::AppConfig;
use crate::middleware::rate_limit::RateLimitPolicy;

/// How often the in-memory store drops expired windows.
const MEMORY_PURGE_INTERVAL: Duration = Duration::from_secs(60);

fn memory_store() -> Arc<dyn CounterStore> {
    let store = Arc::new(InMemoryCounterStore::new());
    store.spawn_purge(MEMORY_PURGE_INTERVAL);
    store
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// `None` when no counter store could be set up; every decision is then
    /// degraded.
    pub limiter: Option<AdaptiveRateLimiter>,
    pub limits: Arc<EndpointLimits>,
    pub tokens: Arc<dyn TokenService>,
    pub rate_limit_enabled: bool,
    pub adaptive: bool,
}

impl AppState {
    /// Build the application state. Only a malformed rule table is fatal;
    /// store trouble degrades the limiter instead.
    pub async fn new(config: &AppConfig) -> Result<Self, ConfigError> {
        let limits = match &config.rate_limit.rules_path {
            Some(path) => {
                let limits = EndpointLimits::from_file(path)?;
                tracing::info!(
                    path = %path.display(),
                    rules = limits.rules().len(),
                    "Loaded rate limit rules"
                );
                limits
            }
            None => EndpointLimits::builtin(),
        };

        #[cfg(feature = "redis")]
        let store: Option<Arc<dyn CounterStore>> = {
            match RedisCounterStore::new(&config.redis).await {
                Ok(store) => Some(Arc::new(store)),
                Err(e) if config.redis.fallback_to_memory => {
                    tracing::warn!(
                        "Failed to connect to Redis: {}. Using in-memory counter store.",
                        e
                    );
                    Some(memory_store())
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to connect to Redis: {}. Rate limiting will fail open.",
                        e
                    );
                    None
                }
            }
        };

        #[cfg(not(feature = "redis"))]
        let store: Option<Arc<dyn CounterStore>> = {
            tracing::info!("Running without redis feature - using in-memory counter store");
            Some(memory_store())
        };

        let limiter = store.map(|store| {
            AdaptiveRateLimiter::new(store).store_timeout(config.rate_limit.store_timeout)
        });

        tracing::info!("Application state initialized");

        Ok(Self {
            limiter,
            limits: Arc::new(limits),
            tokens: Arc::new(JwtTokenService::new(config.jwt.clone())),
            rate_limit_enabled: config.rate_limit.enabled,
            adaptive: config.rate_limit.adaptive,
        })
    }

    /// The slice of state the rate-limit middleware runs on.
    pub fn rate_limit_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            limiter: self.limiter.clone(),
            limits: self.limits.clone(),
            tokens: self.tokens.clone(),
            enabled: self.rate_limit_enabled,
            adaptive: self.adaptive,
        }
    }
}
