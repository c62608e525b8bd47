//! Cache backends: L1 (local map), L2 (Redis) and their tiered composition.

mod memory;
mod redis;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub use self::memory::{CachedEntry, MemoryBackend};
pub use self::redis::RedisBackend;

use crate::error::CacheResult;
use crate::metrics;

/// Storage for the raw entries of one named cache.
///
/// ## Modes
///
/// - **Local**: process-local map only
/// - **Redis**: shared Redis only
/// - **Tiered**: local map (L1) in front of Redis (L2)
///
/// ## Lookup Order (tiered)
///
/// 1. Check L1 - microsecond latency
/// 2. Check L2 - millisecond latency, promote hits to L1 for `local_ttl`
/// 3. Report a miss
///
/// Writes go to L2 first and reach L1 only once L2 accepted them. Deletes
/// clear L1, then L2, then publish the key so other processes clear their L1.
#[derive(Clone)]
pub enum CacheBackend {
    /// Single-process: local map only
    Local(MemoryBackend),

    /// Shared Redis without a local tier
    Redis(RedisBackend),

    /// Redis + local L1
    Tiered {
        local: MemoryBackend,
        redis: RedisBackend,
        local_ttl: Duration,
        channel: Arc<str>,
    },
}

impl CacheBackend {
    /// Create a new local-only backend for cache `name`.
    pub fn new_local(name: &str) -> Self {
        CacheBackend::Local(MemoryBackend::new(name))
    }

    pub fn name(&self) -> &str {
        match self {
            CacheBackend::Local(local) | CacheBackend::Tiered { local, .. } => local.name(),
            CacheBackend::Redis(redis) => redis.name(),
        }
    }

    /// Get a raw entry.
    pub async fn get(&self, key: &str) -> CacheResult<Option<Arc<Vec<u8>>>> {
        let result = match self {
            CacheBackend::Local(local) => {
                let hit = local.get(key);
                if hit.is_some() {
                    metrics::record_cache_hit(local.name(), "L1");
                }
                hit
            }
            CacheBackend::Redis(redis) => {
                let hit = self.guard(redis.get(key).await, "get")?.map(Arc::new);
                if hit.is_some() {
                    metrics::record_cache_hit(redis.name(), "L2");
                }
                hit
            }
            CacheBackend::Tiered {
                local,
                redis,
                local_ttl,
                ..
            } => {
                if let Some(data) = local.get(key) {
                    tracing::trace!(cache = %local.name(), key = %key, "cache hit (L1)");
                    metrics::record_cache_hit(local.name(), "L1");
                    return Ok(Some(data));
                }

                match self.guard(redis.get(key).await, "get")? {
                    Some(data) => {
                        tracing::trace!(cache = %local.name(), key = %key, "cache hit (L2)");
                        metrics::record_cache_hit(local.name(), "L2");
                        let data = Arc::new(data);
                        local.set_shared(key, Arc::clone(&data), *local_ttl);
                        Some(data)
                    }
                    None => None,
                }
            }
        };

        if result.is_none() {
            metrics::record_cache_miss(self.name());
        }
        Ok(result)
    }

    /// Store a raw entry with `ttl`.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        match self {
            CacheBackend::Local(local) => {
                local.set(key, value, ttl);
                Ok(())
            }
            CacheBackend::Redis(redis) => self.guard(redis.set(key, &value, ttl).await, "set"),
            CacheBackend::Tiered {
                local,
                redis,
                local_ttl,
                ..
            } => {
                self.guard(redis.set(key, &value, ttl).await, "set")?;
                local.set(key, value, ttl.min(*local_ttl));
                Ok(())
            }
        }
    }

    /// Remove an entry from every tier.
    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        match self {
            CacheBackend::Local(local) => {
                local.delete(key);
                Ok(())
            }
            CacheBackend::Redis(redis) => self.guard(redis.delete(key).await, "delete"),
            CacheBackend::Tiered {
                local,
                redis,
                channel,
                ..
            } => {
                local.delete(key);
                self.guard(redis.delete(key).await, "delete")?;
                self.publish(redis, channel, key).await;
                Ok(())
            }
        }
    }

    pub async fn batch_delete(&self, keys: &[String]) -> CacheResult<()> {
        match self {
            CacheBackend::Local(local) => {
                local.batch_delete(keys);
                Ok(())
            }
            CacheBackend::Redis(redis) => {
                self.guard(redis.batch_delete(keys).await, "batch_delete")
            }
            CacheBackend::Tiered {
                local,
                redis,
                channel,
                ..
            } => {
                local.batch_delete(keys);
                self.guard(redis.batch_delete(keys).await, "batch_delete")?;
                for key in keys {
                    self.publish(redis, channel, key).await;
                }
                Ok(())
            }
        }
    }

    /// Fetch several entries. Missing keys are absent from the result.
    pub async fn batch_get(&self, keys: &[String]) -> CacheResult<HashMap<String, Arc<Vec<u8>>>> {
        match self {
            CacheBackend::Local(local) => Ok(local.batch_get(keys)),
            CacheBackend::Redis(redis) => Ok(self
                .guard(redis.batch_get(keys).await, "batch_get")?
                .into_iter()
                .map(|(k, v)| (k, Arc::new(v)))
                .collect()),
            CacheBackend::Tiered {
                local,
                redis,
                local_ttl,
                ..
            } => {
                let mut found = local.batch_get(keys);
                let missing: Vec<String> = keys
                    .iter()
                    .filter(|k| !found.contains_key(*k))
                    .cloned()
                    .collect();

                for (key, data) in self.guard(redis.batch_get(&missing).await, "batch_get")? {
                    let data = Arc::new(data);
                    local.set_shared(&key, Arc::clone(&data), *local_ttl);
                    found.insert(key, data);
                }
                Ok(found)
            }
        }
    }

    /// Write several entries atomically with one shared `ttl`.
    pub async fn batch_set_transactional(
        &self,
        entries: Vec<(String, Vec<u8>)>,
        ttl: Duration,
    ) -> CacheResult<()> {
        match self {
            CacheBackend::Local(local) => {
                local.batch_set(entries, ttl);
                Ok(())
            }
            CacheBackend::Redis(redis) => self.guard(
                redis.batch_set_transactional(&entries, ttl).await,
                "batch_set",
            ),
            CacheBackend::Tiered {
                local,
                redis,
                local_ttl,
                ..
            } => {
                self.guard(
                    redis.batch_set_transactional(&entries, ttl).await,
                    "batch_set",
                )?;
                local.batch_set(entries, ttl.min(*local_ttl));
                Ok(())
            }
        }
    }

    /// Reset the TTL of several entries atomically.
    pub async fn batch_expire_transactional(&self, keys: &[String], ttl: Duration) -> CacheResult<()> {
        match self {
            CacheBackend::Local(local) => {
                local.batch_expire(keys, ttl);
                Ok(())
            }
            CacheBackend::Redis(redis) => self.guard(
                redis.batch_expire_transactional(keys, ttl).await,
                "batch_expire",
            ),
            CacheBackend::Tiered {
                local,
                redis,
                local_ttl,
                ..
            } => {
                self.guard(
                    redis.batch_expire_transactional(keys, ttl).await,
                    "batch_expire",
                )?;
                local.batch_expire(keys, ttl.min(*local_ttl));
                Ok(())
            }
        }
    }

    /// Get backend statistics (L1 only).
    pub fn stats(&self) -> BackendStats {
        match self {
            CacheBackend::Local(local) => BackendStats {
                l1_entries: local.len(),
                mode: "local".to_string(),
            },
            CacheBackend::Redis(_) => BackendStats {
                l1_entries: 0,
                mode: "redis".to_string(),
            },
            CacheBackend::Tiered { local, .. } => BackendStats {
                l1_entries: local.len(),
                mode: "tiered".to_string(),
            },
        }
    }

    /// Check if Redis is available (for health checks).
    pub async fn is_redis_available(&self) -> bool {
        match self {
            CacheBackend::Local(_) => false,
            CacheBackend::Redis(redis) | CacheBackend::Tiered { redis, .. } => {
                redis.is_available().await
            }
        }
    }

    /// Get the local tier (for the janitor, the pub/sub listener and tests).
    pub fn local_cache(&self) -> Option<&MemoryBackend> {
        match self {
            CacheBackend::Local(local) | CacheBackend::Tiered { local, .. } => Some(local),
            CacheBackend::Redis(_) => None,
        }
    }

    fn guard<T>(&self, result: CacheResult<T>, operation: &'static str) -> CacheResult<T> {
        if let Err(e) = &result {
            tracing::warn!(cache = %self.name(), operation, error = %e, "cache backend error");
            metrics::record_backend_error(self.name(), operation);
        }
        result
    }

    async fn publish(&self, redis: &RedisBackend, channel: &str, key: &str) {
        // L2 is already cleared; a lost message only delays other processes'
        // L1 until their local TTL runs out.
        if let Err(e) = redis.publish_invalidation(channel, key).await {
            tracing::warn!(cache = %self.name(), key = %key, error = %e, "Redis PUBLISH error");
            metrics::record_backend_error(self.name(), "publish");
        }
    }
}

/// Backend statistics.
#[derive(Debug, Clone)]
pub struct BackendStats {
    pub l1_entries: usize,
    pub mode: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_backend_contract() {
        let backend = CacheBackend::new_local("test");
        assert_eq!(backend.name(), "test");

        backend
            .set("a", b"1".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(backend.get("a").await.unwrap(), Some(Arc::new(b"1".to_vec())));

        backend.delete("a").await.unwrap();
        assert_eq!(backend.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_local_batch_contract() {
        let backend = CacheBackend::new_local("test");
        backend
            .batch_set_transactional(
                vec![
                    ("a".to_string(), b"1".to_vec()),
                    ("b".to_string(), b"2".to_vec()),
                ],
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        let keys = vec!["a".to_string(), "b".to_string()];
        assert_eq!(backend.batch_get(&keys).await.unwrap().len(), 2);

        backend
            .batch_expire_transactional(&keys, Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(backend.batch_get(&keys).await.unwrap().is_empty());

        backend.batch_delete(&keys).await.unwrap();
        let stats = backend.stats();
        assert_eq!(stats.mode, "local");
        assert_eq!(stats.l1_entries, 0);
    }

    #[tokio::test]
    async fn test_local_backend_has_no_redis() {
        let backend = CacheBackend::new_local("test");
        assert!(!backend.is_redis_available().await);
        assert!(backend.local_cache().is_some());
    }
}
