//! Per-cache backend construction.

use std::sync::Arc;
use std::time::Duration;

use deadpool_redis::Pool;
use tokio::task::JoinHandle;

use crate::backend::{CacheBackend, MemoryBackend, RedisBackend};
use crate::pubsub::InvalidationListener;

/// Default interval of the local janitor sweep.
pub const DEFAULT_JANITOR_INTERVAL: Duration = Duration::from_secs(60);

/// Hands out one [`CacheBackend`] per named cache.
///
/// Built once at startup. With Redis every cache gets its own L1 tier (unless
/// `local_ttl` is zero) registered with a shared invalidation listener.
///
/// The listener task outlives the provider and its clones, since the L1 tiers
/// it evicts do; it runs until [`BackendProvider::stop_listener`] is called or
/// the runtime shuts down.
#[derive(Clone)]
pub struct BackendProvider {
    janitor_interval: Duration,
    mode: ProviderMode,
}

impl std::fmt::Debug for BackendProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendProvider")
            .field("mode", &self.mode())
            .field("janitor_interval", &self.janitor_interval)
            .finish()
    }
}

#[derive(Clone)]
enum ProviderMode {
    Local,
    Redis {
        pool: Pool,
        key_prefix: Arc<str>,
        channel: Arc<str>,
        local_ttl: Duration,
        listener: Option<InvalidationListener>,
        listener_task: Option<Arc<JoinHandle<()>>>,
    },
}

impl BackendProvider {
    /// Local-only caching (no Redis configured or Redis unreachable).
    pub fn local(janitor_interval: Duration) -> Self {
        Self {
            janitor_interval,
            mode: ProviderMode::Local,
        }
    }

    /// Redis-backed caching.
    ///
    /// When `local_ttl` is non-zero, entries read from Redis are kept in L1
    /// for at most `local_ttl` and an [`InvalidationListener`] subscribed to
    /// `channel` is started on `redis_url`. Must be called inside a Tokio
    /// runtime.
    pub fn redis(
        pool: Pool,
        redis_url: &str,
        key_prefix: &str,
        channel: &str,
        local_ttl: Duration,
        janitor_interval: Duration,
    ) -> Self {
        let (listener, listener_task) = if local_ttl.is_zero() {
            (None, None)
        } else {
            let listener = InvalidationListener::new(redis_url, channel);
            // Caches registered later are seen by the running task
            let task = listener.clone().start();
            (Some(listener), Some(Arc::new(task)))
        };

        Self {
            janitor_interval,
            mode: ProviderMode::Redis {
                pool,
                key_prefix: Arc::from(key_prefix),
                channel: Arc::from(channel),
                local_ttl,
                listener,
                listener_task,
            },
        }
    }

    /// Whether the invalidation listener task is running.
    pub fn is_listening(&self) -> bool {
        match &self.mode {
            ProviderMode::Redis {
                listener_task: Some(task),
                ..
            } => !task.is_finished(),
            _ => false,
        }
    }

    /// Stop the invalidation listener. L1 tiers keep serving entries until
    /// their local TTL runs out, but no longer see remote invalidations.
    pub fn stop_listener(&self) {
        if let ProviderMode::Redis {
            listener_task: Some(task),
            ..
        } = &self.mode
        {
            task.abort();
            tracing::info!("cache invalidation listener stopped");
        }
    }

    /// `"local"`, `"redis"` or `"tiered"`.
    pub fn mode(&self) -> &'static str {
        match &self.mode {
            ProviderMode::Local => "local",
            ProviderMode::Redis { listener: None, .. } => "redis",
            ProviderMode::Redis { .. } => "tiered",
        }
    }

    /// Build the backend for cache `name` whose entries live for `ttl`.
    ///
    /// Must be called inside a Tokio runtime: local tiers start their janitor.
    pub fn backend(&self, name: &str, ttl: Duration) -> CacheBackend {
        match &self.mode {
            ProviderMode::Local => {
                let local = MemoryBackend::new(name);
                local.spawn_janitor(self.janitor_interval);
                CacheBackend::Local(local)
            }
            ProviderMode::Redis {
                pool,
                key_prefix,
                channel,
                local_ttl,
                listener,
                ..
            } => {
                let redis = RedisBackend::new(pool.clone(), key_prefix, name);
                let Some(listener) = listener else {
                    return CacheBackend::Redis(redis);
                };

                let local = MemoryBackend::new(name);
                local.spawn_janitor(self.janitor_interval);
                listener.register(&local);

                CacheBackend::Tiered {
                    local,
                    redis,
                    local_ttl: (*local_ttl).min(ttl),
                    channel: Arc::clone(channel),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lazy_pool() -> Pool {
        deadpool_redis::Config::from_url("redis://127.0.0.1:6379")
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .unwrap()
    }

    #[tokio::test]
    async fn test_local_provider_builds_local_backends() {
        let provider = BackendProvider::local(DEFAULT_JANITOR_INTERVAL);
        assert_eq!(provider.mode(), "local");

        let backend = provider.backend("app_exists", Duration::from_secs(300));
        assert!(matches!(backend, CacheBackend::Local(_)));
        assert_eq!(backend.name(), "app_exists");
    }

    #[tokio::test]
    async fn test_redis_provider_without_local_ttl_has_no_l1() {
        let provider = BackendProvider::redis(
            lazy_pool(),
            "redis://127.0.0.1:6379",
            "appauth",
            "appauth:cache:invalidate",
            Duration::ZERO,
            DEFAULT_JANITOR_INTERVAL,
        );
        assert_eq!(provider.mode(), "redis");

        let backend = provider.backend("app", Duration::from_secs(300));
        assert!(matches!(backend, CacheBackend::Redis(_)));
        assert!(backend.local_cache().is_none());
    }

    #[tokio::test]
    async fn test_tiered_local_ttl_is_capped_by_cache_ttl() {
        let provider = BackendProvider::redis(
            lazy_pool(),
            "redis://127.0.0.1:6379",
            "appauth",
            "appauth:cache:invalidate",
            Duration::from_secs(30),
            DEFAULT_JANITOR_INTERVAL,
        );
        assert_eq!(provider.mode(), "tiered");

        match provider.backend("access_keys", Duration::from_secs(10)) {
            CacheBackend::Tiered { local_ttl, .. } => {
                assert_eq!(local_ttl, Duration::from_secs(10));
            }
            _ => panic!("expected a tiered backend"),
        }
    }

    #[tokio::test]
    async fn test_stop_listener_ends_the_task() {
        let provider = BackendProvider::redis(
            lazy_pool(),
            "redis://127.0.0.1:1",
            "appauth",
            "appauth:cache:invalidate",
            Duration::from_secs(30),
            DEFAULT_JANITOR_INTERVAL,
        );
        // Clones share the task
        let handle = provider.clone();
        drop(provider);
        assert!(handle.is_listening());

        handle.stop_listener();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_listening());
        assert!(!BackendProvider::local(DEFAULT_JANITOR_INTERVAL).is_listening());
    }
}
