//! Cache service: namespacing, enable switch, degraded-mode reads, and
//! single-flight read-through population.

use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

use crate::backend::CacheBackend;

/// Tunables for the cache service.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Master switch. When off, reads miss and writes are dropped.
    pub enabled: bool,
    /// TTL applied when the caller does not supply one.
    pub default_ttl: Duration,
    /// Prefix prepended to every key before it reaches the backend.
    pub prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl: Duration::from_secs(3600),
            prefix: "genesis:".to_string(),
        }
    }
}

/// Namespaced TTL cache over a pluggable backend.
///
/// Backend failures never propagate: `get` degrades to a miss, `put` and
/// `forget` report `false`, and `remember` falls back to running its
/// producer. Callers stay correct when the cache is down, just slower.
pub struct CacheService {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
    /// Per-key gates serializing concurrent `remember` producers.
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CacheService {
    /// Creates a service over `backend` with the given config.
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self { backend, config, inflight: Mutex::new(HashMap::new()) }
    }

    /// Whether caching is enabled.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.config.prefix, key)
    }

    /// Fetches a cached value. Disabled or failing caches read as a miss.
    pub async fn get(&self, key: &str) -> Option<Value> {
        if !self.config.enabled {
            return None;
        }
        self.backend_get(&self.namespaced(key)).await
    }

    /// Stores a value under `key` for `ttl` (default TTL when `None`).
    ///
    /// Returns whether the value was actually stored.
    pub async fn put(&self, key: &str, value: Value, ttl: Option<Duration>) -> bool {
        if !self.config.enabled {
            return false;
        }
        self.backend_put(&self.namespaced(key), value, ttl.unwrap_or(self.config.default_ttl))
            .await
    }

    /// Removes a cached value. Returns whether an entry existed.
    pub async fn forget(&self, key: &str) -> bool {
        if !self.config.enabled {
            return false;
        }

        match self.backend.forget(&self.namespaced(key)).await {
            Ok(existed) => existed,
            Err(e) => {
                warn!(key, error = %e, "cache forget failed");
                false
            },
        }
    }

    /// Read-through fetch: returns the cached value or runs `producer`,
    /// caches its output, and returns it.
    ///
    /// Concurrent calls for the same key are single-flighted: one runs
    /// the producer while the rest wait and then read the cached result.
    /// With caching disabled the producer runs on every call. Producer
    /// errors propagate unchanged and nothing is cached.
    pub async fn remember<F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        producer: F,
    ) -> Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        if !self.config.enabled {
            return producer().await;
        }

        let full_key = self.namespaced(key);

        if let Some(value) = self.backend_get(&full_key).await {
            return Ok(value);
        }

        let gate = {
            let mut inflight = self.inflight.lock().await;
            inflight.entry(full_key.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        let guard = gate.lock().await;

        // Another caller may have populated the key while we waited
        if let Some(value) = self.backend_get(&full_key).await {
            return Ok(value);
        }

        let result = producer().await;
        if let Ok(value) = &result {
            self.backend_put(&full_key, value.clone(), ttl.unwrap_or(self.config.default_ttl))
                .await;
        }

        drop(guard);
        self.inflight.lock().await.remove(&full_key);

        result
    }

    async fn backend_get(&self, full_key: &str) -> Option<Value> {
        match self.backend.get(full_key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key = full_key, error = %e, "cache read failed, treating as miss");
                None
            },
        }
    }

    async fn backend_put(&self, full_key: &str, value: Value, ttl: Duration) -> bool {
        match self.backend.put(full_key, value, ttl).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key = full_key, error = %e, "cache write failed, value not stored");
                false
            },
        }
    }
}
