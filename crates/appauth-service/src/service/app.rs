use appauth_store::{AppRecord, AppStore, AppUpdate, DynStore, NewAccessKey};

use crate::cache::{CacheRegistry, InvalidationCoordinator};
use crate::config::AccessKeyConfig;
use crate::crypto::{SecretCipher, generate_secret};
use crate::error::{ServiceError, ServiceResult};

/// App lifecycle.
#[derive(Clone)]
pub struct AppService {
    store: DynStore,
    caches: CacheRegistry,
    invalidation: InvalidationCoordinator,
    cipher: SecretCipher,
    rules: AccessKeyConfig,
}

impl std::fmt::Debug for AppService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppService")
            .field("caches", &self.caches)
            .finish_non_exhaustive()
    }
}

impl AppService {
    pub fn new(
        store: DynStore,
        caches: CacheRegistry,
        invalidation: InvalidationCoordinator,
        cipher: SecretCipher,
        rules: AccessKeyConfig,
    ) -> Self {
        Self {
            store,
            caches,
            invalidation,
            cipher,
            rules,
        }
    }

    /// Whether app `code` exists.
    pub async fn exists(&self, code: &str) -> ServiceResult<bool> {
        self.caches
            .app_exists(code)
            .await
            .map_err(|e| ServiceError::cache("AppService.exists", e))
    }

    /// The app record, `None` if the app does not exist.
    pub async fn get(&self, code: &str) -> ServiceResult<Option<AppRecord>> {
        self.caches
            .get_app(code)
            .await
            .map_err(|e| ServiceError::cache("AppService.get", e))
    }

    pub async fn list(&self) -> ServiceResult<Vec<AppRecord>> {
        self.store
            .list_apps()
            .await
            .map_err(|e| ServiceError::store("AppService.list", e))
    }

    /// Create `app` with a generated first secret, returned in plaintext.
    ///
    /// The plaintext is not stored anywhere and cannot be recovered by this
    /// call later; the caller must hand it to the app owner now.
    pub async fn create(&self, app: &AppRecord, created_source: &str) -> ServiceResult<String> {
        let secret = generate_secret(self.rules.secret_length);
        self.create_with_secret(app, &secret, created_source).await?;
        Ok(secret)
    }

    /// Create `app` with `secret` as its first access key.
    pub async fn create_with_secret(
        &self,
        app: &AppRecord,
        secret: &str,
        created_source: &str,
    ) -> ServiceResult<()> {
        const OPERATION: &str = "AppService.create";

        validate_app(app)?;
        if secret.is_empty() {
            return Err(ServiceError::validation("app secret must not be empty"));
        }

        let exists = self
            .store
            .app_exists(&app.code)
            .await
            .map_err(|e| ServiceError::store(OPERATION, e))?;
        if exists {
            return Err(ServiceError::validation(format!(
                "app code `{}` already exists",
                app.code
            )));
        }
        let name_taken = self
            .store
            .name_exists(&app.name)
            .await
            .map_err(|e| ServiceError::store(OPERATION, e))?;
        if name_taken {
            return Err(ServiceError::validation(format!(
                "app name `{}` already exists",
                app.name
            )));
        }

        let app_secret = self
            .cipher
            .encrypt_to_base64(secret)
            .map_err(|e| ServiceError::crypto(OPERATION, e))?;
        let first_key = NewAccessKey {
            app_code: app.code.clone(),
            app_secret,
            enabled: true,
            created_source: created_source.to_string(),
        };
        self.store
            .create_app(app, first_key)
            .await
            .map_err(|e| ServiceError::store(OPERATION, e))?;

        // Absence may already be cached for this code
        let _ = self.invalidation.invalidate_all(&app.code).await;

        tracing::info!(app_code = %app.code, created_source, "app created");
        Ok(())
    }

    pub async fn update(&self, code: &str, update: &AppUpdate) -> ServiceResult<()> {
        const OPERATION: &str = "AppService.update";

        if update.is_empty() {
            return Err(ServiceError::validation("app update has no fields"));
        }
        if update.name.as_deref().is_some_and(str::is_empty) {
            return Err(ServiceError::validation("app name must not be empty"));
        }

        let updated = self
            .store
            .update_app(code, update)
            .await
            .map_err(|e| ServiceError::store(OPERATION, e))?;
        if !updated {
            return Err(ServiceError::not_found("app", code));
        }

        let _ = self.invalidation.invalidate_app(code).await;

        tracing::info!(app_code = code, "app updated");
        Ok(())
    }

    /// Delete app `code` and all of its access keys.
    pub async fn delete(&self, code: &str) -> ServiceResult<()> {
        let deleted = self
            .store
            .delete_app(code)
            .await
            .map_err(|e| ServiceError::store("AppService.delete", e))?;
        if !deleted {
            return Err(ServiceError::not_found("app", code));
        }

        let _ = self.invalidation.invalidate_all(code).await;

        tracing::info!(app_code = code, "app deleted");
        Ok(())
    }
}

fn validate_app(app: &AppRecord) -> ServiceResult<()> {
    if app.code.is_empty() {
        return Err(ServiceError::validation("app code must not be empty"));
    }
    if app.code.contains(char::is_whitespace) || app.code.contains(':') {
        return Err(ServiceError::validation(
            "app code must not contain whitespace or ':'",
        ));
    }
    if app.name.is_empty() {
        return Err(ServiceError::validation("app name must not be empty"));
    }
    Ok(())
}
