//! Distributed (L2) tier backed by Redis.
//!
//! Every key is namespaced as `{prefix}:{cache name}:{key}` so deployments and
//! caches sharing one Redis never collide. Multi-key writes run inside a
//! `MULTI`/`EXEC` pipeline, so another reader never observes half of a group.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use deadpool_redis::{Connection, Pool};
use redis::AsyncCommands;

use crate::error::{CacheError, CacheResult};

#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool,
    name: Arc<str>,
    namespace: Arc<str>,
}

impl RedisBackend {
    pub fn new(pool: Pool, key_prefix: &str, name: &str) -> Self {
        Self {
            pool,
            name: Arc::from(name),
            namespace: Arc::from(format!("{key_prefix}:{name}")),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full Redis key for a cache key.
    pub fn gen_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    async fn conn(&self) -> CacheResult<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::backend("connect", format!("failed to get Redis connection: {e}")))
    }

    pub async fn is_available(&self) -> bool {
        self.pool.get().await.is_ok()
    }

    pub async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        conn.get::<_, Option<Vec<u8>>>(self.gen_key(key))
            .await
            .map_err(|e| CacheError::backend("get", e.to_string()))
    }

    pub async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn().await?;
        let _: () = redis::cmd("SET")
            .arg(self.gen_key(key))
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::backend("set", e.to_string()))?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(self.gen_key(key))
            .await
            .map_err(|e| CacheError::backend("delete", e.to_string()))
    }

    /// Delete all `keys` with a single `DEL`.
    pub async fn batch_delete(&self, keys: &[String]) -> CacheResult<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let namespaced: Vec<String> = keys.iter().map(|k| self.gen_key(k)).collect();
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(namespaced)
            .await
            .map_err(|e| CacheError::backend("batch_delete", e.to_string()))
    }

    /// Fetch all `keys` with a single `MGET`. Missing keys are absent from the map.
    pub async fn batch_get(&self, keys: &[String]) -> CacheResult<HashMap<String, Vec<u8>>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let namespaced: Vec<String> = keys.iter().map(|k| self.gen_key(k)).collect();
        let mut conn = self.conn().await?;
        // Explicit MGET: a one-element key list must not degrade to GET
        let values: Vec<Option<Vec<u8>>> = redis::cmd("MGET")
            .arg(&namespaced)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::backend("batch_get", e.to_string()))?;

        Ok(keys
            .iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|v| (key.clone(), v)))
            .collect())
    }

    /// Set every entry with the same TTL inside one transaction.
    pub async fn batch_set_transactional(
        &self,
        entries: &[(String, Vec<u8>)],
        ttl: Duration,
    ) -> CacheResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let millis = ttl_millis(ttl);
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in entries {
            pipe.cmd("SET")
                .arg(self.gen_key(key))
                .arg(value.as_slice())
                .arg("PX")
                .arg(millis)
                .ignore();
        }

        let mut conn = self.conn().await?;
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::backend("batch_set", e.to_string()))?;
        Ok(())
    }

    /// Reset the TTL of every key inside one transaction.
    pub async fn batch_expire_transactional(&self, keys: &[String], ttl: Duration) -> CacheResult<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let millis = ttl_millis(ttl);
        let mut pipe = redis::pipe();
        pipe.atomic();
        for key in keys {
            pipe.cmd("PEXPIRE").arg(self.gen_key(key)).arg(millis).ignore();
        }

        let mut conn = self.conn().await?;
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::backend("batch_expire", e.to_string()))?;
        Ok(())
    }

    /// Publish an invalidation message `{cache name}:{key}` on `channel`.
    pub async fn publish_invalidation(&self, channel: &str, key: &str) -> CacheResult<()> {
        let payload = format!("{}:{}", self.name, key);
        let mut conn = self.conn().await?;
        conn.publish::<_, _, ()>(channel, &payload)
            .await
            .map_err(|e| CacheError::backend("publish", e.to_string()))?;

        tracing::debug!(channel = %channel, payload = %payload, "published cache invalidation");
        Ok(())
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    // PX 0 is rejected by Redis
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}
