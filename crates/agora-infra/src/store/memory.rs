//! In-memory counter store - used when Redis is not available.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use agora_core::StoreError;
use agora_core::ports::{Clock, CounterStore, ScoreUpdate, SystemClock, WindowHit};

struct CounterEntry {
    value: i64,
    expires_at: Option<DateTime<Utc>>,
}

/// Process-local counter store on a HashMap behind an async RwLock.
///
/// Every mutation holds the write lock for its whole read-modify-write, which
/// makes each operation atomic per process.
/// Note: Counters are not shared between instances and are lost on restart.
pub struct InMemoryCounterStore {
    entries: RwLock<HashMap<String, CounterEntry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Store whose expiry follows `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn is_live(entry: &CounterEntry, now: DateTime<Utc>) -> bool {
        entry.expires_at.map(|exp| exp > now).unwrap_or(true)
    }

    fn remaining(entry: &CounterEntry, now: DateTime<Utc>) -> Option<Duration> {
        entry
            .expires_at
            .and_then(|exp| (exp - now).to_std().ok())
            .filter(|d| !d.is_zero())
    }

    fn expiry(now: DateTime<Utc>, ttl: Duration) -> Option<DateTime<Utc>> {
        chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
    }

    /// Drop expired entries. Reads already ignore them; this only frees memory.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| Self::is_live(entry, now));
        before - entries.len()
    }

    /// Number of stored entries, expired ones included until purged.
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Purge expired entries every `every` on a background task. The task
    /// stops once the store is dropped.
    pub fn spawn_purge(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let purged = store.purge_expired().await;
                if purged > 0 {
                    tracing::debug!(purged, "Purged expired counters");
                }
            }
        })
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| Self::is_live(e, now))
            .map(|e| e.value))
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| Self::is_live(e, now))
            .and_then(|e| Self::remaining(e, now)))
    }

    async fn increment_below(
        &self,
        key: &str,
        cap: u64,
        ttl: Duration,
    ) -> Result<WindowHit, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;

        if entries.get(key).is_some_and(|e| !Self::is_live(e, now)) {
            entries.remove(key);
        }

        let entry = entries.entry(key.to_string()).or_insert_with(|| CounterEntry {
            value: 0,
            expires_at: Self::expiry(now, ttl),
        });
        let count = entry.value.max(0) as u64;

        if count >= cap {
            return Ok(WindowHit {
                admitted: false,
                count,
                ttl: Self::remaining(entry, now),
            });
        }

        entry.value += 1;
        if entry.expires_at.is_none() {
            entry.expires_at = Self::expiry(now, ttl);
        }

        Ok(WindowHit {
            admitted: true,
            count: entry.value as u64,
            ttl: Self::remaining(entry, now),
        })
    }

    async fn add_clamped(&self, key: &str, update: ScoreUpdate) -> Result<i64, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;

        let current = entries
            .get(key)
            .filter(|e| Self::is_live(e, now))
            .map(|e| e.value)
            .unwrap_or(update.default);
        let value = current
            .saturating_add(update.delta)
            .clamp(update.min, update.max);

        entries.insert(
            key.to_string(),
            CounterEntry {
                value,
                expires_at: Self::expiry(now, update.ttl),
            },
        );
        Ok(value)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
