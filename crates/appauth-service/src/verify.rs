//! Secret verification.

use crate::cache::CacheRegistry;
use crate::crypto::SecretCipher;
use crate::error::{ServiceError, ServiceResult};
use crate::metrics::{self, VerificationOutcome};
use crate::observability::AUDIT_TARGET;

/// Checks a presented secret against the cached at-rest secrets of an app.
#[derive(Debug, Clone)]
pub struct AccessKeyVerifier {
    caches: CacheRegistry,
    cipher: SecretCipher,
}

impl AccessKeyVerifier {
    pub fn new(caches: CacheRegistry, cipher: SecretCipher) -> Self {
        Self { caches, cipher }
    }

    /// Returns `Ok(true)` only if `secret` matches an enabled key of
    /// `app_code`.
    ///
    /// An unknown app, an app without keys, an unknown secret and a disabled
    /// key all give `Ok(false)`. A failed lookup is an error, never `false`.
    pub async fn verify(&self, app_code: &str, secret: &str) -> ServiceResult<bool> {
        const OPERATION: &str = "AccessKeyVerifier.verify";

        let secrets = match self.caches.access_key_secrets(app_code).await {
            Ok(secrets) => secrets,
            Err(e) => {
                tracing::warn!(app_code, error = %e, "access key lookup failed");
                metrics::record_verification(VerificationOutcome::Error);
                return Err(ServiceError::cache(OPERATION, e));
            }
        };

        if secrets.is_empty() {
            metrics::record_verification(VerificationOutcome::Rejected);
            return Ok(false);
        }

        let encrypted = self.cipher.encrypt_to_base64(secret).map_err(|e| {
            metrics::record_verification(VerificationOutcome::Error);
            ServiceError::crypto(OPERATION, e)
        })?;

        match secrets.get(&encrypted) {
            Some(true) => {
                metrics::record_verification(VerificationOutcome::Accepted);
                Ok(true)
            }
            Some(false) => {
                tracing::warn!(
                    target: AUDIT_TARGET,
                    app_code,
                    "disabled access key presented"
                );
                metrics::record_verification(VerificationOutcome::Disabled);
                Ok(false)
            }
            None => {
                metrics::record_verification(VerificationOutcome::Rejected);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use appauth_cache::{BackendProvider, DEFAULT_JANITOR_INTERVAL};
    use appauth_store::{AccessKeyStore, AppRecord, AppStore, InMemoryStore, NewAccessKey};
    use std::sync::Arc;

    const KEY: &[u8] = b"AES256Key32Characters12345678901";
    const NONCE: &[u8] = b"0123456789ab";

    fn cipher() -> SecretCipher {
        SecretCipher::new(KEY, NONCE).unwrap()
    }

    fn verifier(store: &Arc<InMemoryStore>) -> AccessKeyVerifier {
        let caches = CacheRegistry::new(
            &BackendProvider::local(DEFAULT_JANITOR_INTERVAL),
            &CacheConfig::default(),
            store.clone(),
        );
        AccessKeyVerifier::new(caches, cipher())
    }

    async fn seed(store: &InMemoryStore, code: &str, secrets: &[(&str, bool)]) {
        let encrypt = |s: &str| cipher().encrypt_to_base64(s).unwrap();
        let new_key = |secret: &str, enabled: bool| NewAccessKey {
            app_code: code.to_string(),
            app_secret: encrypt(secret),
            enabled,
            created_source: "test".to_string(),
        };

        let (first, rest) = secrets.split_first().unwrap();
        let app = AppRecord {
            code: code.to_string(),
            name: code.to_string(),
            description: String::new(),
            tenant_mode: "single".to_string(),
            tenant_id: "default".to_string(),
        };
        store.create_app(&app, new_key(first.0, first.1)).await.unwrap();
        for (secret, enabled) in rest {
            store.create_access_key(new_key(secret, *enabled)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_enabled_secret_matches() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, "A", &[("s1", true), ("s2", true)]).await;
        let verifier = verifier(&store);

        assert!(verifier.verify("A", "s1").await.unwrap());
        assert!(verifier.verify("A", "s2").await.unwrap());
        assert!(!verifier.verify("A", "s3").await.unwrap());
    }

    #[tokio::test]
    async fn test_disabled_secret_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, "A", &[("s1", false)]).await;

        assert!(!verifier(&store).verify("A", "s1").await.unwrap());
    }

    #[tokio::test]
    async fn test_app_without_secrets() {
        let store = Arc::new(InMemoryStore::new());
        assert!(!verifier(&store).verify("B", "anything").await.unwrap());
    }

    #[tokio::test]
    async fn test_store_failure_is_an_error() {
        let store = Arc::new(InMemoryStore::new());
        store.set_unavailable(true);

        let err = verifier(&store).verify("A", "s1").await.unwrap_err();
        assert!(err.is_infrastructure());
        assert!(matches!(err, ServiceError::Cache { .. }));
    }

    #[tokio::test]
    async fn test_repeated_verification_hits_cache() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, "A", &[("s1", true)]).await;
        let verifier = verifier(&store);
        let before = store.stats().reads;

        for _ in 0..5 {
            assert!(verifier.verify("A", "s1").await.unwrap());
        }
        assert_eq!(store.stats().reads - before, 1);
    }
}
