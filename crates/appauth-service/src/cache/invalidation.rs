//! Write-triggered cache invalidation.
//!
//! Called after a store mutation commits and before the write is reported to
//! its caller. A failed delete does not undo or fail the write: the stale
//! entry then lives until its TTL runs out, so every failure is logged at
//! `error` and counted.

use appauth_cache::{CacheKey, CacheResult, NamedCache};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::registry::CacheRegistry;
use crate::metrics;

/// Deletes every cache entry that could be stale after a write.
#[derive(Debug, Clone)]
pub struct InvalidationCoordinator {
    caches: CacheRegistry,
}

impl InvalidationCoordinator {
    pub fn new(caches: CacheRegistry) -> Self {
        Self { caches }
    }

    /// Drop the cached existence flag and record of `app_code`.
    ///
    /// Both deletes are attempted; the first failure is returned.
    pub async fn invalidate_app(&self, app_code: &str) -> CacheResult<()> {
        let exists = delete(self.caches.app_exists_cache(), CacheKey::app_exists(app_code)).await;
        let record = delete(self.caches.app_cache(), CacheKey::app(app_code)).await;
        exists.and(record)
    }

    /// Drop the cached secret map of `app_code`.
    pub async fn invalidate_access_keys(&self, app_code: &str) -> CacheResult<()> {
        delete(self.caches.access_keys_cache(), CacheKey::access_keys(app_code)).await
    }

    /// Drop everything cached about `app_code`.
    pub async fn invalidate_all(&self, app_code: &str) -> CacheResult<()> {
        let app = self.invalidate_app(app_code).await;
        let keys = self.invalidate_access_keys(app_code).await;
        app.and(keys)
    }
}

async fn delete<V>(cache: &NamedCache<V>, key: CacheKey) -> CacheResult<()>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let result = cache.delete(&key).await;
    match &result {
        Ok(()) => {
            tracing::debug!(cache = %cache.name(), key = %key, "cache entry invalidated");
        }
        Err(e) => {
            tracing::error!(
                cache = %cache.name(),
                key = %key,
                error = %e,
                "cache invalidation failed, entry stays stale until TTL expiry"
            );
            metrics::record_invalidation_failure(cache.name());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use appauth_cache::{BackendProvider, DEFAULT_JANITOR_INTERVAL};
    use appauth_store::{AccessKeyStore, AppRecord, AppStore, AppUpdate, InMemoryStore, NewAccessKey};
    use std::sync::Arc;

    fn record(code: &str, name: &str) -> AppRecord {
        AppRecord {
            code: code.to_string(),
            name: name.to_string(),
            description: String::new(),
            tenant_mode: "single".to_string(),
            tenant_id: "default".to_string(),
        }
    }

    fn key(code: &str, secret: &str) -> NewAccessKey {
        NewAccessKey {
            app_code: code.to_string(),
            app_secret: secret.to_string(),
            enabled: true,
            created_source: "test".to_string(),
        }
    }

    fn setup(store: &Arc<InMemoryStore>) -> (CacheRegistry, InvalidationCoordinator) {
        let caches = CacheRegistry::new(
            &BackendProvider::local(DEFAULT_JANITOR_INTERVAL),
            &CacheConfig::default(),
            store.clone(),
        );
        let coordinator = InvalidationCoordinator::new(caches.clone());
        (caches, coordinator)
    }

    #[tokio::test]
    async fn test_invalidate_app_forces_repopulation() {
        let store = Arc::new(InMemoryStore::new());
        let (caches, coordinator) = setup(&store);

        // Cache the absence, then create behind the cache's back
        assert!(!caches.app_exists("demo").await.unwrap());
        assert_eq!(caches.get_app("demo").await.unwrap(), None);
        store.create_app(&record("demo", "Demo"), key("demo", "s1")).await.unwrap();
        assert!(!caches.app_exists("demo").await.unwrap());

        coordinator.invalidate_app("demo").await.unwrap();

        assert!(caches.app_exists("demo").await.unwrap());
        assert_eq!(
            caches.get_app("demo").await.unwrap(),
            Some(record("demo", "Demo"))
        );
    }

    #[tokio::test]
    async fn test_invalidate_app_drops_updated_record() {
        let store = Arc::new(InMemoryStore::new());
        let (caches, coordinator) = setup(&store);
        store.create_app(&record("demo", "Demo"), key("demo", "s1")).await.unwrap();
        caches.get_app("demo").await.unwrap();

        let update = AppUpdate {
            name: Some("Renamed".to_string()),
            description: None,
        };
        store.update_app("demo", &update).await.unwrap();
        coordinator.invalidate_app("demo").await.unwrap();

        assert_eq!(caches.get_app("demo").await.unwrap().unwrap().name, "Renamed");
    }

    #[tokio::test]
    async fn test_invalidate_access_keys_only_touches_secret_map() {
        let store = Arc::new(InMemoryStore::new());
        let (caches, coordinator) = setup(&store);
        store.create_app(&record("demo", "Demo"), key("demo", "s1")).await.unwrap();

        caches.app_exists("demo").await.unwrap();
        assert_eq!(caches.access_key_secrets("demo").await.unwrap().len(), 1);

        store.create_access_key(key("demo", "s2")).await.unwrap();
        coordinator.invalidate_access_keys("demo").await.unwrap();

        assert_eq!(caches.access_key_secrets("demo").await.unwrap().len(), 2);
        assert!(
            caches
                .app_exists_cache()
                .direct_get(&CacheKey::app_exists("demo"))
                .await
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_invalidate_all() {
        let store = Arc::new(InMemoryStore::new());
        let (caches, coordinator) = setup(&store);
        store.create_app(&record("demo", "Demo"), key("demo", "s1")).await.unwrap();
        caches.app_exists("demo").await.unwrap();
        caches.get_app("demo").await.unwrap();
        caches.access_key_secrets("demo").await.unwrap();

        coordinator.invalidate_all("demo").await.unwrap();

        assert!(!caches.app_exists_cache().exists(&CacheKey::app_exists("demo")).await);
        assert!(!caches.app_cache().exists(&CacheKey::app("demo")).await);
        assert!(!caches.access_keys_cache().exists(&CacheKey::access_keys("demo")).await);
    }
}
