//! Redis counter store. Multi-step operations run as Lua scripts so each one
//! is atomic on the server.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, Script};

use agora_core::StoreError;
use agora_core::ports::{CounterStore, ScoreUpdate, WindowHit};

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Whether to fall back to the in-memory store if Redis is unavailable
    pub fallback_to_memory: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            fallback_to_memory: true,
        }
    }
}

impl RedisConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connect_timeout: Duration::from_secs(
                std::env::var("REDIS_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            fallback_to_memory: std::env::var("REDIS_FALLBACK_TO_MEMORY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
        }
    }
}

// Returns: [admitted, count, pttl]
const INCREMENT_BELOW: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current >= tonumber(ARGV[1]) then
    return {0, current, redis.call('PTTL', KEYS[1])}
end

current = redis.call('INCR', KEYS[1])
if redis.call('PTTL', KEYS[1]) < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return {1, current, redis.call('PTTL', KEYS[1])}
"#;

// ARGV: delta, default, min, max, ttl_ms
const ADD_CLAMPED: &str = r#"
local value = tonumber(redis.call('GET', KEYS[1]) or ARGV[2]) + tonumber(ARGV[1])
local lo = tonumber(ARGV[3])
local hi = tonumber(ARGV[4])
if value < lo then value = lo elseif value > hi then value = hi end

redis.call('SET', KEYS[1], value, 'PX', ARGV[5])
return value
"#;

/// Redis-backed counter store shared by every API instance.
///
/// Uses connection manager for automatic reconnection.
pub struct RedisCounterStore {
    conn: ConnectionManager,
    increment_below: Script,
    add_clamped: Script,
}

impl RedisCounterStore {
    pub async fn new(config: &RedisConfig) -> Result<Self, StoreError> {
        let client = Client::open(config.url.as_str()).map_err(store_error)?;

        // Use timeout to prevent hanging if Redis is unreachable
        let conn = tokio::time::timeout(config.connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(config.connect_timeout))?
            .map_err(store_error)?;

        tracing::info!(url = %config.url, "Connected to Redis counter store");

        Ok(Self {
            conn,
            increment_below: Script::new(INCREMENT_BELOW),
            add_clamped: Script::new(ADD_CLAMPED),
        })
    }

    /// Create from environment configuration.
    pub async fn from_env() -> Result<Self, StoreError> {
        Self::new(&RedisConfig::from_env()).await
    }
}

fn store_error(e: RedisError) -> StoreError {
    if e.is_timeout() || e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped()
    {
        StoreError::Connection(e.to_string())
    } else {
        StoreError::Operation(e.to_string())
    }
}

fn pttl(ms: i64) -> Option<Duration> {
    // -1: no expiry, -2: no key
    u64::try_from(ms)
        .ok()
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

fn millis(d: Duration) -> u64 {
    (d.as_millis() as u64).max(1)
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = conn.get(key).await.map_err(store_error)?;
        Ok(value)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.conn.clone();
        let ms: i64 = redis::cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(pttl(ms))
    }

    async fn increment_below(
        &self,
        key: &str,
        cap: u64,
        ttl: Duration,
    ) -> Result<WindowHit, StoreError> {
        let mut conn = self.conn.clone();
        let result: Vec<i64> = self
            .increment_below
            .key(key)
            .arg(cap)
            .arg(millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(store_error)?;

        match result.as_slice() {
            [admitted, count, ttl_ms] => Ok(WindowHit {
                admitted: *admitted == 1,
                count: (*count).max(0) as u64,
                ttl: pttl(*ttl_ms),
            }),
            other => Err(StoreError::Operation(format!(
                "unexpected script reply: {other:?}"
            ))),
        }
    }

    async fn add_clamped(&self, key: &str, update: ScoreUpdate) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let value: i64 = self
            .add_clamped
            .key(key)
            .arg(update.delta)
            .arg(update.default)
            .arg(update.min)
            .arg(update.max)
            .arg(millis(update.ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(value)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}
