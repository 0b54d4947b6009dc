//! Application configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use agora_core::limiter::DEFAULT_STORE_TIMEOUT;
use agora_infra::JwtConfig;

#[cfg(feature = "redis")]
use agora_infra::RedisConfig;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub rate_limit: RateLimitConfig,
    pub jwt: JwtConfig,
    #[cfg(feature = "redis")]
    pub redis: RedisConfig,
}

/// Limiter switches and the endpoint rule source.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// When off, requests pass through without touching the store.
    pub enabled: bool,
    /// Scale limits by behavior score and record request outcomes.
    pub adaptive: bool,
    /// Upper bound on each counter store call.
    pub store_timeout: Duration,
    /// JSON rule file; the built-in table is used when unset.
    pub rules_path: Option<PathBuf>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            adaptive: true,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            rules_path: None,
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: env_flag("RATE_LIMIT_ENABLED", defaults.enabled),
            adaptive: env_flag("RATE_LIMIT_ADAPTIVE", defaults.adaptive),
            store_timeout: env_parse("RATE_LIMIT_STORE_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.store_timeout),
            rules_path: env::var("RATE_LIMIT_RULES_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env_parse("PORT").unwrap_or(8080),
            rate_limit: RateLimitConfig::from_env(),
            jwt: JwtConfig::from_env(),
            #[cfg(feature = "redis")]
            redis: RedisConfig::from_env(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| parse_flag(&v).unwrap_or(default))
        .unwrap_or(default)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
