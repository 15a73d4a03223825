//! services/api/src/adapters/memory.rs
//!
//! In-memory `CounterStore` for development and single-instance deployments.
//! One mutex guards all keys, which makes each port method atomic.

use async_trait::async_trait;
use reflects_core::ports::{CounterStore, PortResult};
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// A value with the instant it stops being visible.
struct MemoryEntry<T> {
    value: T,
    expires_at: Instant,
}

impl<T> MemoryEntry<T> {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Default)]
struct Tables {
    counters: HashMap<String, MemoryEntry<u64>>,
    /// Events ordered by (score, member), like a Redis sorted set.
    logs: HashMap<String, MemoryEntry<BTreeSet<(i64, String)>>>,
}

/// A counter store that lives inside the process.
#[derive(Default)]
pub struct InMemoryCounterStore {
    tables: Mutex<Tables>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops expired keys. Lookups already ignore them; this only frees memory.
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut tables = self.tables.lock().await;
        tables.counters.retain(|_, entry| entry.is_live(now));
        tables.logs.retain(|_, entry| entry.is_live(now));
        debug!("Completed in-memory counter cleanup");
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn get_count(&self, key: &str) -> PortResult<Option<u64>> {
        let now = Instant::now();
        let tables = self.tables.lock().await;
        Ok(tables
            .counters
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value))
    }

    async fn incr_with_expiry(&self, key: &str, ttl_secs: u64) -> PortResult<u64> {
        let now = Instant::now();
        let mut tables = self.tables.lock().await;
        let entry = tables
            .counters
            .entry(key.to_string())
            .or_insert(MemoryEntry { value: 0, expires_at: now });
        if !entry.is_live(now) {
            entry.value = 0;
        }
        entry.value += 1;
        entry.expires_at = now + Duration::from_secs(ttl_secs);
        Ok(entry.value)
    }

    async fn trim_and_count(&self, key: &str, cutoff_millis: i64) -> PortResult<u64> {
        let now = Instant::now();
        let mut tables = self.tables.lock().await;
        let Some(entry) = tables.logs.get_mut(key) else {
            return Ok(0);
        };
        if !entry.is_live(now) {
            tables.logs.remove(key);
            return Ok(0);
        }
        entry.value.retain(|(score, _)| *score >= cutoff_millis);
        Ok(entry.value.len() as u64)
    }

    async fn add_event(
        &self,
        key: &str,
        member: &str,
        score_millis: i64,
        ttl_secs: u64,
    ) -> PortResult<()> {
        let now = Instant::now();
        let mut tables = self.tables.lock().await;
        let entry = tables
            .logs
            .entry(key.to_string())
            .or_insert(MemoryEntry { value: BTreeSet::new(), expires_at: now });
        if !entry.is_live(now) {
            entry.value.clear();
        }
        // Same member replaces its previous score, as ZADD does.
        entry.value.retain(|(_, existing)| existing != member);
        entry.value.insert((score_millis, member.to_string()));
        entry.expires_at = now + Duration::from_secs(ttl_secs);
        Ok(())
    }
}
