//! Hot cache client interface (component D, §4.5, §6.1).
//!
//! `get` / `set_with_ttl` / `del`, no transactions. Optional accelerator in
//! front of the DRS: its absence or failure must never change correctness,
//! only latency — callers fall back to the DRS and log the outage once via
//! [`tutor_core::degradation::OnceFlag`].

pub mod error;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

pub use error::CacheError;

#[async_trait]
pub trait HotCache: Send + Sync {
    async fn get(&self, key: &str) -> error::Result<Option<Value>>;

    async fn set_with_ttl(&self, key: &str, value: Value, ttl_secs: u64) -> error::Result<()>;

    async fn del(&self, key: &str) -> error::Result<()>;

    /// Read the value and, if present, reset its TTL to `ttl_secs` in the
    /// same operation — used by the session cache to keep hot entries alive
    /// under steady traffic without a separate round trip.
    async fn get_and_refresh(&self, key: &str, ttl_secs: u64) -> error::Result<Option<Value>>;
}

struct Entry {
    value: Value,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// DashMap-backed TTL cache. Expiry is checked lazily on access rather than
/// via a background sweep — adequate for the session/teaching-checkpoint
/// traffic this crate fronts.
#[derive(Default)]
pub struct InMemoryCache {
    entries: DashMap<String, Entry>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

#[async_trait]
impl HotCache for InMemoryCache {
    async fn get(&self, key: &str) -> error::Result<Option<Value>> {
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => Ok(Some(entry.value.clone())),
            Some(_) => {
                self.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: Value, ttl_secs: u64) -> error::Result<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + Duration::from_secs(ttl_secs),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> error::Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn get_and_refresh(&self, key: &str, ttl_secs: u64) -> error::Result<Option<Value>> {
        let Some(mut entry) = self.entries.get_mut(key) else {
            return Ok(None);
        };
        if entry.is_expired() {
            drop(entry);
            self.entries.remove(key);
            return Ok(None);
        }
        entry.expires_at = Instant::now() + Duration::from_secs(ttl_secs);
        Ok(Some(entry.value.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = InMemoryCache::new();
        cache.set_with_ttl("k", json!({"a": 1}), 60).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn expired_entry_reads_as_missing() {
        let cache = InMemoryCache::new();
        cache.set_with_ttl("k", json!("v"), 0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn del_removes_entry() {
        let cache = InMemoryCache::new();
        cache.set_with_ttl("k", json!("v"), 60).await.unwrap();
        cache.del("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn get_and_refresh_extends_ttl() {
        let cache = InMemoryCache::new();
        cache.set_with_ttl("k", json!("v"), 0).await.unwrap();
        let refreshed = cache.get_and_refresh("k", 60).await.unwrap();
        assert_eq!(refreshed, Some(json!("v")));
        // Original TTL was 0; a plain get would have expired it, but
        // get_and_refresh should have already pushed expiry out.
        assert_eq!(cache.get("k").await.unwrap(), Some(json!("v")));
    }
}
