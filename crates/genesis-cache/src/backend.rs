//! Cache backend trait and the in-memory implementation.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use genesis_core::Clock;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::CacheError;

/// Storage backend for cached values.
///
/// Keys arriving here are already namespaced by the service. Backends
/// own expiry: a `get` after the TTL has elapsed must return `None`.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetches a value, honoring its TTL.
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Stores a value for `ttl`.
    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError>;

    /// Removes a value. Returns whether an entry existed.
    async fn forget(&self, key: &str) -> Result<bool, CacheError>;
}

/// In-process cache backend over a `HashMap`.
///
/// Expiry reads the injected [`Clock`], so tests can expire entries by
/// advancing a `TestClock` instead of sleeping.
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, (Value, DateTime<Utc>)>>,
    clock: Arc<dyn Clock>,
}

impl MemoryBackend {
    /// Creates a backend reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { entries: RwLock::new(HashMap::new()), clock }
    }

    /// Number of live (unexpired) entries.
    pub async fn len(&self) -> usize {
        let now = self.clock.now_utc();
        self.entries.read().await.values().filter(|(_, exp)| *exp > now).count()
    }

    /// Whether the cache holds no live entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let now = self.clock.now_utc();
        let entries = self.entries.read().await;

        Ok(entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(value, _)| value.clone()))
    }

    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = self.clock.now_utc()
            + chrono::Duration::from_std(ttl)
                .map_err(|e| CacheError::Unavailable(format!("ttl out of range: {e}")))?;

        self.entries.write().await.insert(key.to_string(), (value, expires_at));
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use genesis_core::TestClock;
    use serde_json::json;

    use super::*;

    fn backend_with_clock() -> (MemoryBackend, TestClock) {
        let clock = TestClock::new();
        let backend = MemoryBackend::new(Arc::new(clock.clone()));
        (backend, clock)
    }

    #[tokio::test]
    async fn stores_and_fetches_within_ttl() {
        let (backend, _clock) = backend_with_clock();

        backend.put("k", json!({"a": 1}), Duration::from_secs(60)).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn entry_expires_after_ttl() {
        let (backend, clock) = backend_with_clock();

        backend.put("k", json!(1), Duration::from_secs(60)).await.unwrap();
        clock.advance(Duration::from_secs(61));

        assert_eq!(backend.get("k").await.unwrap(), None);
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn forget_reports_presence() {
        let (backend, _clock) = backend_with_clock();

        backend.put("k", json!(1), Duration::from_secs(60)).await.unwrap();
        assert!(backend.forget("k").await.unwrap());
        assert!(!backend.forget("k").await.unwrap());
    }
}
