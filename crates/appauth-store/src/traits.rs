//! Store traits.
//!
//! Implementations must be thread-safe (`Send + Sync`). Every method returns
//! an error only for infrastructure failures.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::{AccessKey, AppRecord, AppUpdate, EncryptedSecret, NewAccessKey};

/// App records.
#[async_trait]
pub trait AppStore: Send + Sync {
    async fn app_exists(&self, code: &str) -> StoreResult<bool>;

    /// Returns `None` if the app does not exist.
    async fn get_app(&self, code: &str) -> StoreResult<Option<AppRecord>>;

    async fn list_apps(&self) -> StoreResult<Vec<AppRecord>>;

    async fn name_exists(&self, name: &str) -> StoreResult<bool>;

    /// Inserts `app` together with its first access key in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Duplicate` if the code or name is taken.
    async fn create_app(&self, app: &AppRecord, first_key: NewAccessKey) -> StoreResult<i64>;

    /// Returns `false` if the app does not exist.
    async fn update_app(&self, code: &str, update: &AppUpdate) -> StoreResult<bool>;

    /// Deletes the app and all of its access keys. Returns `false` if the app
    /// does not exist.
    async fn delete_app(&self, code: &str) -> StoreResult<bool>;
}

/// Access keys.
#[async_trait]
pub trait AccessKeyStore: Send + Sync {
    /// Every at-rest secret of the app with its enabled flag.
    async fn list_encrypted_secrets(&self, app_code: &str) -> StoreResult<Vec<EncryptedSecret>>;

    async fn list_access_keys(&self, app_code: &str) -> StoreResult<Vec<AccessKey>>;

    async fn count_access_keys(&self, app_code: &str) -> StoreResult<usize>;

    /// Returns the id of the new key.
    async fn create_access_key(&self, key: NewAccessKey) -> StoreResult<i64>;

    /// Returns `false` if no key `id` belongs to `app_code`.
    async fn update_access_key_enabled(&self, app_code: &str, id: i64, enabled: bool) -> StoreResult<bool>;

    /// Returns `false` if no key `id` belongs to `app_code`.
    async fn delete_access_key(&self, app_code: &str, id: i64) -> StoreResult<bool>;

    async fn access_key_exists(&self, app_code: &str, id: i64) -> StoreResult<bool>;
}

/// A store serving both apps and access keys.
pub trait Store: AppStore + AccessKeyStore {}

impl<T: AppStore + AccessKeyStore> Store for T {}
