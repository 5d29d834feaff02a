//! In-process TTL store

use super::store::KvBackend;
use crate::clock::Clock;
use crate::error::StoreResult;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: i64,
}

/// DashMap-backed store; expiry is checked against the injected clock
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    fn is_live(&self, entry: &Entry) -> bool {
        entry.expires_at > self.clock.now_secs()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| self.is_live(e.value())).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining lifetime of a key in seconds
    pub fn ttl_of(&self, key: &str) -> Option<i64> {
        let now = self.clock.now_secs();
        self.entries
            .get(key)
            .map(|e| e.expires_at - now)
            .filter(|remaining| *remaining > 0)
    }
}

#[async_trait]
impl KvBackend for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        if let Some(entry) = self.entries.get(key) {
            if self.is_live(&entry) {
                return Ok(Some(entry.value.clone()));
            }
        }
        // Re-checked under the shard lock so a concurrent put survives
        self.entries.remove_if(key, |_, entry| !self.is_live(entry));
        Ok(None)
    }

    async fn put(&self, key: &str, value: Value, ttl_secs: u64) -> StoreResult<()> {
        let expires_at = self.clock.now_secs().saturating_add(ttl_secs as i64);
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix) && self.is_live(e.value()))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn purge_expired(&self) -> StoreResult<u64> {
        let now = self.clock.now_secs();
        let mut removed = 0u64;
        self.entries.retain(|_, entry| {
            let live = entry.expires_at > now;
            if !live {
                removed += 1;
            }
            live
        });
        if removed > 0 {
            debug!("Purged {} expired entries", removed);
        }
        Ok(removed)
    }
}
