use std::sync::Arc;

use appauth_cache::BackendProvider;
use appauth_store::DynStore;

use crate::cache::{CacheRegistry, InvalidationCoordinator};
use crate::config::AppConfig;
use crate::create_backend_provider;
use crate::crypto::SecretCipher;
use crate::error::{ServiceError, ServiceResult};
use crate::observability;
use crate::service::{AccessKeyService, AppService};
use crate::verify::AccessKeyVerifier;

/// Everything the credential subsystem needs, built once at startup.
///
/// Share it by `Arc`; dropping the last handle is the teardown.
#[derive(Debug)]
pub struct AuthState {
    pub config: AppConfig,
    pub provider: BackendProvider,
    pub caches: CacheRegistry,
    pub invalidation: InvalidationCoordinator,
    pub verifier: AccessKeyVerifier,
    pub apps: AppService,
    pub access_keys: AccessKeyService,
}

impl AuthState {
    /// Validate `config` and wire the caches, cipher and services over `store`.
    ///
    /// Applies `config.logging.level` if tracing was set up with
    /// [`init_tracing`](crate::observability::init_tracing).
    ///
    /// Falls back to local-only caching when Redis is configured but
    /// unreachable.
    pub async fn build(config: &AppConfig, store: DynStore) -> ServiceResult<Arc<Self>> {
        config.validate().map_err(ServiceError::config)?;
        observability::apply_logging_level(&config.logging.level);

        let cipher = SecretCipher::from_config(&config.crypto)
            .map_err(|e| ServiceError::crypto("AuthState.build", e))?;

        let provider = create_backend_provider(&config.redis, &config.cache).await;
        let caches = CacheRegistry::new(&provider, &config.cache, Arc::clone(&store));
        let invalidation = InvalidationCoordinator::new(caches.clone());
        let verifier = AccessKeyVerifier::new(caches.clone(), cipher.clone());

        let apps = AppService::new(
            Arc::clone(&store),
            caches.clone(),
            invalidation.clone(),
            cipher.clone(),
            config.access_keys.clone(),
        );
        let access_keys = AccessKeyService::new(
            store,
            invalidation.clone(),
            verifier.clone(),
            cipher,
            config.access_keys.clone(),
        );

        tracing::info!(cache_mode = provider.mode(), "Auth state initialized");

        Ok(Arc::new(Self {
            config: config.clone(),
            provider,
            caches,
            invalidation,
            verifier,
            apps,
            access_keys,
        }))
    }
}
