//! Explicit TTL cache service.
//!
//! Values are JSON so one cache instance can serve several callers; keys are
//! namespaced by the caller. Entries expire after the configured TTL and are
//! dropped immediately by `invalidate`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use covenant_utils::CovenantResult;

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> CovenantResult<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> CovenantResult<()>;
    async fn invalidate(&self, key: &str) -> CovenantResult<()>;
}

pub struct MemoryCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, (Value, Instant)>>,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, (_, expires_at)| *expires_at > Instant::now());
        before - entries.len()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> CovenantResult<Option<Value>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: Value) -> CovenantResult<()> {
        let expires_at = Instant::now() + self.ttl;
        self.entries.write().await.insert(key.to_string(), (value, expires_at));
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> CovenantResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_invalidate() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        cache.set("party:acme", json!("id-1")).await.unwrap();
        assert_eq!(cache.get("party:acme").await.unwrap(), Some(json!("id-1")));

        cache.invalidate("party:acme").await.unwrap();
        assert_eq!(cache.get("party:acme").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = MemoryCache::new(Duration::from_millis(10));
        cache.set("k", json!(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(cache.purge_expired().await, 1);
    }
}
