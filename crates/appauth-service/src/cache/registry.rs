use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use appauth_cache::{
    BackendProvider, CacheError, CacheKey, CacheResult, Codec, NamedCache, Retriever,
};
use appauth_store::{AccessKeyStore, AppRecord, AppStore, DynStore};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::CacheConfig;
use crate::error::retrieval_error;

/// At-rest secret → enabled flag, for one app.
pub type AccessKeySecretMap = HashMap<String, bool>;

/// Cache names, also the second segment of every Redis key.
pub mod names {
    pub const APP_EXISTS: &str = "app_exists";
    pub const APP: &str = "app_info";
    pub const ACCESS_KEYS: &str = "access_keys_map";
}

/// The domain caches, built once at startup and shared by handle.
#[derive(Debug, Clone)]
pub struct CacheRegistry {
    app_exists: NamedCache<bool>,
    app: NamedCache<Option<AppRecord>>,
    access_keys: NamedCache<AccessKeySecretMap>,
}

impl CacheRegistry {
    /// Build every domain cache on `provider`, reading through to `store`.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(provider: &BackendProvider, config: &CacheConfig, store: DynStore) -> Self {
        let app_exists = {
            let store = Arc::clone(&store);
            move |key: CacheKey| {
                let store = Arc::clone(&store);
                async move {
                    store
                        .app_exists(&key.render())
                        .await
                        .map_err(|e| retrieval_error("app_exists", e))
                }
            }
        };

        let app = {
            let store = Arc::clone(&store);
            move |key: CacheKey| {
                let store = Arc::clone(&store);
                async move {
                    store
                        .get_app(&key.render())
                        .await
                        .map_err(|e| retrieval_error("get_app", e))
                }
            }
        };

        let access_keys = move |key: CacheKey| {
            let store = Arc::clone(&store);
            async move {
                let secrets = store
                    .list_encrypted_secrets(&key.render())
                    .await
                    .map_err(|e| retrieval_error("list_encrypted_secrets", e))?;
                Ok::<_, CacheError>(
                    secrets
                        .into_iter()
                        .map(|s| (s.secret, s.enabled))
                        .collect::<AccessKeySecretMap>(),
                )
            }
        };

        let registry = Self {
            app_exists: build(provider, config, names::APP_EXISTS, config.app_exists_ttl(), app_exists),
            app: build(provider, config, names::APP, config.app_ttl(), app),
            access_keys: build(
                provider,
                config,
                names::ACCESS_KEYS,
                config.access_keys_ttl(),
                access_keys,
            ),
        };

        tracing::info!(
            mode = provider.mode(),
            disabled = config.disabled,
            "Domain caches initialized"
        );
        registry
    }

    /// Whether an app with `app_code` exists.
    pub async fn app_exists(&self, app_code: &str) -> CacheResult<bool> {
        self.app_exists.get(&CacheKey::app_exists(app_code)).await
    }

    /// The app record, `None` if the app does not exist.
    pub async fn get_app(&self, app_code: &str) -> CacheResult<Option<AppRecord>> {
        self.app.get(&CacheKey::app(app_code)).await
    }

    /// Every at-rest secret of the app with its enabled flag.
    pub async fn access_key_secrets(&self, app_code: &str) -> CacheResult<AccessKeySecretMap> {
        self.access_keys.get(&CacheKey::access_keys(app_code)).await
    }

    pub fn app_exists_cache(&self) -> &NamedCache<bool> {
        &self.app_exists
    }

    pub fn app_cache(&self) -> &NamedCache<Option<AppRecord>> {
        &self.app
    }

    pub fn access_keys_cache(&self) -> &NamedCache<AccessKeySecretMap> {
        &self.access_keys
    }
}

fn build<V>(
    provider: &BackendProvider,
    config: &CacheConfig,
    name: &str,
    ttl: Duration,
    retriever: impl Retriever<V> + 'static,
) -> NamedCache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    if config.disabled {
        return NamedCache::disabled(name, ttl, retriever);
    }
    NamedCache::new(provider.backend(name, ttl), ttl, retriever)
        .with_codec(Codec::new(config.compression_threshold))
}
