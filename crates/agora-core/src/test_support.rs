//! Store doubles for the limiter's unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::ports::{Clock, CounterStore, ScoreUpdate, WindowHit};

/// HashMap store whose expiry follows the injected clock.
pub struct MapStore {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, (i64, Option<DateTime<Utc>>)>>,
}

impl MapStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn raw(&self, key: &str) -> Option<i64> {
        self.get(key).await.unwrap()
    }

    fn expiry(&self, ttl: Duration) -> Option<DateTime<Utc>> {
        Some(self.clock.now() + chrono::Duration::from_std(ttl).unwrap())
    }

    fn live(&self, entry: Option<&(i64, Option<DateTime<Utc>>)>) -> Option<(i64, Option<DateTime<Utc>>)> {
        let now = self.clock.now();
        entry
            .copied()
            .filter(|(_, exp)| exp.map(|e| e > now).unwrap_or(true))
    }
}

#[async_trait]
impl CounterStore for MapStore {
    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let entries = self.entries.lock().await;
        Ok(self.live(entries.get(key)).map(|(v, _)| v))
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let entries = self.entries.lock().await;
        let now = self.clock.now();
        Ok(self
            .live(entries.get(key))
            .and_then(|(_, exp)| exp)
            .and_then(|exp| (exp - now).to_std().ok()))
    }

    async fn increment_below(
        &self,
        key: &str,
        cap: u64,
        ttl: Duration,
    ) -> Result<WindowHit, StoreError> {
        let mut entries = self.entries.lock().await;
        let now = self.clock.now();
        let current = self.live(entries.get(key));
        let count = current.map(|(v, _)| v.max(0) as u64).unwrap_or(0);
        let remaining = |exp: Option<DateTime<Utc>>| exp.and_then(|e| (e - now).to_std().ok());

        if count >= cap {
            return Ok(WindowHit {
                admitted: false,
                count,
                ttl: current.and_then(|(_, exp)| remaining(exp)),
            });
        }

        let expires = match current {
            Some((_, exp)) => exp,
            None => self.expiry(ttl),
        };
        entries.insert(key.to_string(), (count as i64 + 1, expires));
        Ok(WindowHit {
            admitted: true,
            count: count + 1,
            ttl: remaining(expires),
        })
    }

    async fn add_clamped(&self, key: &str, update: ScoreUpdate) -> Result<i64, StoreError> {
        let mut entries = self.entries.lock().await;
        let current = self
            .live(entries.get(key))
            .map(|(v, _)| v)
            .unwrap_or(update.default);
        let next = (current + update.delta).clamp(update.min, update.max);
        entries.insert(key.to_string(), (next, self.expiry(update.ttl)));
        Ok(next)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Store that fails every call, counting how often it was asked.
#[derive(Default)]
pub struct FailingStore {
    pub calls: AtomicUsize,
}

impl FailingStore {
    fn fail<T>(&self) -> Result<T, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Connection("connection refused".to_string()))
    }
}

#[async_trait]
impl CounterStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<i64>, StoreError> {
        self.fail()
    }

    async fn ttl(&self, _key: &str) -> Result<Option<Duration>, StoreError> {
        self.fail()
    }

    async fn increment_below(
        &self,
        _key: &str,
        _cap: u64,
        _ttl: Duration,
    ) -> Result<WindowHit, StoreError> {
        self.fail()
    }

    async fn add_clamped(&self, _key: &str, _update: ScoreUpdate) -> Result<i64, StoreError> {
        self.fail()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.fail()
    }
}

/// Store that never answers, to exercise call timeouts.
pub struct HangingStore;

#[async_trait]
impl CounterStore for HangingStore {
    async fn get(&self, _key: &str) -> Result<Option<i64>, StoreError> {
        std::future::pending().await
    }

    async fn ttl(&self, _key: &str) -> Result<Option<Duration>, StoreError> {
        std::future::pending().await
    }

    async fn increment_below(
        &self,
        _key: &str,
        _cap: u64,
        _ttl: Duration,
    ) -> Result<WindowHit, StoreError> {
        std::future::pending().await
    }

    async fn add_clamped(&self, _key: &str, _update: ScoreUpdate) -> Result<i64, StoreError> {
        std::future::pending().await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        std::future::pending().await
    }
}
