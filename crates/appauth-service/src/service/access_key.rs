use appauth_store::{AccessKeyStore, AppStore, DynStore, NewAccessKey};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::cache::InvalidationCoordinator;
use crate::config::AccessKeyConfig;
use crate::crypto::{SecretCipher, generate_secret};
use crate::error::{ServiceError, ServiceResult};
use crate::verify::AccessKeyVerifier;

/// An access key with its secret in plaintext.
///
/// Only ever handed to the app owner, never persisted in this form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlainAccessKey {
    pub id: i64,
    pub app_code: String,
    pub app_secret: String,
    pub enabled: bool,
}

/// A listed access key, decrypted for its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedAccessKey {
    #[serde(flatten)]
    pub key: PlainAccessKey,
    pub created_source: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Access key lifecycle and verification.
#[derive(Clone)]
pub struct AccessKeyService {
    store: DynStore,
    invalidation: InvalidationCoordinator,
    verifier: AccessKeyVerifier,
    cipher: SecretCipher,
    rules: AccessKeyConfig,
}

impl std::fmt::Debug for AccessKeyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessKeyService")
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

impl AccessKeyService {
    pub fn new(
        store: DynStore,
        invalidation: InvalidationCoordinator,
        verifier: AccessKeyVerifier,
        cipher: SecretCipher,
        rules: AccessKeyConfig,
    ) -> Self {
        Self {
            store,
            invalidation,
            verifier,
            cipher,
            rules,
        }
    }

    /// Check `secret` against the enabled keys of `app_code`.
    pub async fn verify(&self, app_code: &str, secret: &str) -> ServiceResult<bool> {
        self.verifier.verify(app_code, secret).await
    }

    /// Create a key with a generated secret.
    pub async fn create(&self, app_code: &str, created_source: &str) -> ServiceResult<PlainAccessKey> {
        let secret = generate_secret(self.rules.secret_length);
        self.create_with_secret(app_code, &secret, created_source).await
    }

    /// Create a key with a caller-chosen secret.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the app already has `max_per_app` keys or
    /// `secret` is empty, and `NotFound` if the app does not exist.
    pub async fn create_with_secret(
        &self,
        app_code: &str,
        secret: &str,
        created_source: &str,
    ) -> ServiceResult<PlainAccessKey> {
        const OPERATION: &str = "AccessKeyService.create";

        if secret.is_empty() {
            return Err(ServiceError::validation("app secret must not be empty"));
        }

        let exists = self
            .store
            .app_exists(app_code)
            .await
            .map_err(|e| ServiceError::store(OPERATION, e))?;
        if !exists {
            return Err(ServiceError::not_found("app", app_code));
        }

        // Check-then-insert: two concurrent creates may both pass
        let count = self.count(OPERATION, app_code).await?;
        if count >= self.rules.max_per_app {
            return Err(ServiceError::validation(format!(
                "app `{app_code}` already has {count} access keys, the maximum is {}",
                self.rules.max_per_app
            )));
        }

        let app_secret = self
            .cipher
            .encrypt_to_base64(secret)
            .map_err(|e| ServiceError::crypto(OPERATION, e))?;
        let id = self
            .store
            .create_access_key(NewAccessKey {
                app_code: app_code.to_string(),
                app_secret,
                enabled: true,
                created_source: created_source.to_string(),
            })
            .await
            .map_err(|e| ServiceError::store(OPERATION, e))?;

        let _ = self.invalidation.invalidate_access_keys(app_code).await;

        tracing::info!(app_code, key_id = id, created_source, "access key created");
        Ok(PlainAccessKey {
            id,
            app_code: app_code.to_string(),
            app_secret: secret.to_string(),
            enabled: true,
        })
    }

    pub async fn update_enabled(&self, app_code: &str, id: i64, enabled: bool) -> ServiceResult<()> {
        let updated = self
            .store
            .update_access_key_enabled(app_code, id, enabled)
            .await
            .map_err(|e| ServiceError::store("AccessKeyService.update_enabled", e))?;
        if !updated {
            return Err(unknown_key(app_code, id));
        }

        let _ = self.invalidation.invalidate_access_keys(app_code).await;

        tracing::info!(app_code, key_id = id, enabled, "access key updated");
        Ok(())
    }

    /// Delete key `id`. The app keeps at least `min_per_app` keys.
    pub async fn delete(&self, app_code: &str, id: i64) -> ServiceResult<()> {
        const OPERATION: &str = "AccessKeyService.delete";

        let exists = self
            .store
            .access_key_exists(app_code, id)
            .await
            .map_err(|e| ServiceError::store(OPERATION, e))?;
        if !exists {
            return Err(unknown_key(app_code, id));
        }

        let count = self.count(OPERATION, app_code).await?;
        if count <= self.rules.min_per_app {
            return Err(ServiceError::validation(format!(
                "app `{app_code}` must keep at least {} access key(s)",
                self.rules.min_per_app
            )));
        }

        let deleted = self
            .store
            .delete_access_key(app_code, id)
            .await
            .map_err(|e| ServiceError::store(OPERATION, e))?;
        if !deleted {
            return Err(unknown_key(app_code, id));
        }

        let _ = self.invalidation.invalidate_access_keys(app_code).await;

        tracing::info!(app_code, key_id = id, "access key deleted");
        Ok(())
    }

    /// Every key of `app_code`, with secrets decrypted.
    pub async fn list(&self, app_code: &str) -> ServiceResult<Vec<ListedAccessKey>> {
        const OPERATION: &str = "AccessKeyService.list";

        let keys = self
            .store
            .list_access_keys(app_code)
            .await
            .map_err(|e| ServiceError::store(OPERATION, e))?;

        keys.into_iter()
            .map(|key| {
                let app_secret = self
                    .cipher
                    .decrypt_from_base64(&key.app_secret)
                    .map_err(|e| ServiceError::crypto(OPERATION, e))?;
                Ok(ListedAccessKey {
                    key: PlainAccessKey {
                        id: key.id,
                        app_code: key.app_code,
                        app_secret,
                        enabled: key.enabled,
                    },
                    created_source: key.created_source,
                    created_at: key.created_at,
                })
            })
            .collect()
    }

    async fn count(&self, operation: &str, app_code: &str) -> ServiceResult<usize> {
        self.store
            .count_access_keys(app_code)
            .await
            .map_err(|e| ServiceError::store(operation, e))
    }
}

fn unknown_key(app_code: &str, id: i64) -> ServiceError {
    ServiceError::validation(format!("app `{app_code}` has no access key {id}"))
}
