//! App credential verification.
//!
//! Apps authenticate with an app code and a secret. Secrets are stored only
//! encrypted; verification re-encrypts the candidate and looks it up in a
//! cached map of the app's at-rest secrets. Reads go through short-TTL caches
//! (local, or local + Redis), and every write to an app or access key deletes
//! the entries it made stale before returning.
//!
//! Build everything with [`AuthState::build`] and share the result.

pub mod cache;
pub mod config;
pub mod crypto;
pub mod error;
pub mod metrics;
pub mod observability;
pub mod service;
pub mod state;
pub mod verify;

use std::time::Duration;

use appauth_cache::BackendProvider;

pub use cache::{AccessKeySecretMap, CacheRegistry, InvalidationCoordinator};
pub use config::{AccessKeyConfig, AppConfig, CacheConfig, CryptoConfig, RedisConfig};
pub use crypto::{CryptoError, SecretCipher, generate_secret};
pub use error::{ServiceError, ServiceResult};
pub use service::{AccessKeyService, AppService, ListedAccessKey, PlainAccessKey};
pub use state::AuthState;
pub use verify::AccessKeyVerifier;

/// Create the backend provider for the domain caches.
///
/// With Redis enabled and reachable every cache is tiered (L1 local + L2
/// Redis) and L1 entries are evicted by pub/sub invalidations. Otherwise
/// caching stays local to this process.
pub async fn create_backend_provider(redis: &RedisConfig, cache: &CacheConfig) -> BackendProvider {
    let janitor_interval = cache.janitor_interval();

    if !redis.enabled {
        tracing::info!("Redis disabled, using local cache only");
        return BackendProvider::local(janitor_interval);
    }

    tracing::info!(url = %redis.url, "Connecting to Redis");

    // from_url leaves the pool unset
    let mut pool_config = deadpool_redis::Config::from_url(&redis.url);
    let pool = pool_config
        .pool
        .get_or_insert_with(|| deadpool_redis::PoolConfig::new(redis.pool_size));
    let timeout = Some(Duration::from_millis(redis.timeout_ms));
    pool.max_size = redis.pool_size;
    pool.timeouts.wait = timeout;
    pool.timeouts.create = timeout;
    pool.timeouts.recycle = timeout;

    let pool = match pool_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to create Redis pool. Falling back to local cache."
            );
            return BackendProvider::local(janitor_interval);
        }
    };

    match pool.get().await {
        Ok(_) => {
            tracing::info!("Connected to Redis");
            BackendProvider::redis(
                pool,
                &redis.url,
                &redis.key_prefix,
                &redis.channel(),
                cache.local_ttl(),
                janitor_interval,
            )
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to connect to Redis. Falling back to local cache."
            );
            BackendProvider::local(janitor_interval)
        }
    }
}
