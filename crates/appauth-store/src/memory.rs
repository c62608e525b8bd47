//! In-memory store for development and tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::traits::{AccessKeyStore, AppStore};
use crate::types::{AccessKey, AppRecord, AppUpdate, EncryptedSecret, NewAccessKey};

#[derive(Debug, Default)]
struct Tables {
    apps: BTreeMap<String, AppRecord>,
    /// Keyed by id, so listing returns keys in creation order.
    access_keys: BTreeMap<i64, AccessKey>,
    next_key_id: i64,
}

impl Tables {
    fn insert_key(&mut self, key: NewAccessKey) -> i64 {
        self.next_key_id += 1;
        let id = self.next_key_id;
        self.access_keys.insert(
            id,
            AccessKey {
                id,
                app_code: key.app_code,
                app_secret: key.app_secret,
                enabled: key.enabled,
                created_source: key.created_source,
                created_at: OffsetDateTime::now_utc(),
            },
        );
        id
    }

    fn keys_of<'a>(&'a self, app_code: &'a str) -> impl Iterator<Item = &'a AccessKey> + 'a {
        self.access_keys
            .values()
            .filter(move |key| key.app_code == app_code)
    }
}

/// Read/write counters, used by tests to assert that a cache hit did not
/// reach the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub reads: u64,
    pub writes: u64,
}

/// In-memory store.
///
/// All tables sit behind one lock, so multi-table writes such as
/// [`AppStore::create_app`] are atomic.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    reads: AtomicU64,
    writes: AtomicU64,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail with a connection error (or recover).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            reads: self.reads.load(Ordering::SeqCst),
            writes: self.writes.load(Ordering::SeqCst),
        }
    }

    fn read_op(&self) -> StoreResult<()> {
        self.check_available()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn write_op(&self) -> StoreResult<()> {
        self.check_available()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::connection_error("store is unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl AppStore for InMemoryStore {
    async fn app_exists(&self, code: &str) -> StoreResult<bool> {
        self.read_op()?;
        Ok(self.tables.read().await.apps.contains_key(code))
    }

    async fn get_app(&self, code: &str) -> StoreResult<Option<AppRecord>> {
        self.read_op()?;
        Ok(self.tables.read().await.apps.get(code).cloned())
    }

    async fn list_apps(&self) -> StoreResult<Vec<AppRecord>> {
        self.read_op()?;
        Ok(self.tables.read().await.apps.values().cloned().collect())
    }

    async fn name_exists(&self, name: &str) -> StoreResult<bool> {
        self.read_op()?;
        Ok(self
            .tables
            .read()
            .await
            .apps
            .values()
            .any(|app| app.name == name))
    }

    async fn create_app(&self, app: &AppRecord, first_key: NewAccessKey) -> StoreResult<i64> {
        self.write_op()?;
        if first_key.app_code != app.code {
            return Err(StoreError::transaction_error(format!(
                "first access key belongs to `{}`, not `{}`",
                first_key.app_code, app.code
            )));
        }

        let mut tables = self.tables.write().await;
        if tables.apps.contains_key(&app.code) {
            return Err(StoreError::duplicate("app", &app.code));
        }
        if tables.apps.values().any(|existing| existing.name == app.name) {
            return Err(StoreError::duplicate("app name", &app.name));
        }

        tables.apps.insert(app.code.clone(), app.clone());
        let id = tables.insert_key(first_key);
        tracing::debug!(app_code = %app.code, key_id = id, "created app");
        Ok(id)
    }

    async fn update_app(&self, code: &str, update: &AppUpdate) -> StoreResult<bool> {
        self.write_op()?;
        let mut tables = self.tables.write().await;

        let taken = update.name.as_ref().is_some_and(|name| {
            tables
                .apps
                .values()
                .any(|app| app.code != code && &app.name == name)
        });
        if taken {
            return Err(StoreError::duplicate(
                "app name",
                update.name.clone().unwrap_or_default(),
            ));
        }

        let Some(app) = tables.apps.get_mut(code) else {
            return Ok(false);
        };
        if let Some(name) = &update.name {
            app.name = name.clone();
        }
        if let Some(description) = &update.description {
            app.description = description.clone();
        }
        Ok(true)
    }

    async fn delete_app(&self, code: &str) -> StoreResult<bool> {
        self.write_op()?;
        let mut tables = self.tables.write().await;
        if tables.apps.remove(code).is_none() {
            return Ok(false);
        }
        tables.access_keys.retain(|_, key| key.app_code != code);
        Ok(true)
    }
}

#[async_trait]
impl AccessKeyStore for InMemoryStore {
    async fn list_encrypted_secrets(&self, app_code: &str) -> StoreResult<Vec<EncryptedSecret>> {
        self.read_op()?;
        Ok(self
            .tables
            .read()
            .await
            .keys_of(app_code)
            .map(EncryptedSecret::from)
            .collect())
    }

    async fn list_access_keys(&self, app_code: &str) -> StoreResult<Vec<AccessKey>> {
        self.read_op()?;
        Ok(self.tables.read().await.keys_of(app_code).cloned().collect())
    }

    async fn count_access_keys(&self, app_code: &str) -> StoreResult<usize> {
        self.read_op()?;
        Ok(self.tables.read().await.keys_of(app_code).count())
    }

    async fn create_access_key(&self, key: NewAccessKey) -> StoreResult<i64> {
        self.write_op()?;
        let mut tables = self.tables.write().await;
        let duplicate = tables
            .keys_of(&key.app_code)
            .any(|existing| existing.app_secret == key.app_secret);
        if duplicate {
            return Err(StoreError::duplicate("access_key", &key.app_code));
        }
        Ok(tables.insert_key(key))
    }

    async fn update_access_key_enabled(&self, app_code: &str, id: i64, enabled: bool) -> StoreResult<bool> {
        self.write_op()?;
        let mut tables = self.tables.write().await;
        match tables.access_keys.get_mut(&id) {
            Some(key) if key.app_code == app_code => {
                key.enabled = enabled;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_access_key(&self, app_code: &str, id: i64) -> StoreResult<bool> {
        self.write_op()?;
        let mut tables = self.tables.write().await;
        let owned = tables
            .access_keys
            .get(&id)
            .is_some_and(|key| key.app_code == app_code);
        if owned {
            tables.access_keys.remove(&id);
        }
        Ok(owned)
    }

    async fn access_key_exists(&self, app_code: &str, id: i64) -> StoreResult<bool> {
        self.read_op()?;
        Ok(self
            .tables
            .read()
            .await
            .access_keys
            .get(&id)
            .is_some_and(|key| key.app_code == app_code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(code: &str, name: &str) -> AppRecord {
        AppRecord {
            code: code.to_string(),
            name: name.to_string(),
            description: String::new(),
            tenant_mode: "single".to_string(),
            tenant_id: "default".to_string(),
        }
    }

    fn key(app_code: &str, secret: &str) -> NewAccessKey {
        NewAccessKey {
            app_code: app_code.to_string(),
            app_secret: secret.to_string(),
            enabled: true,
            created_source: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_app_with_first_key() {
        let store = InMemoryStore::new();
        let id = store.create_app(&app("demo", "Demo"), key("demo", "s1")).await.unwrap();

        assert!(store.app_exists("demo").await.unwrap());
        assert!(store.name_exists("Demo").await.unwrap());
        assert_eq!(store.get_app("demo").await.unwrap().unwrap().name, "Demo");
        assert!(store.access_key_exists("demo", id).await.unwrap());
        assert_eq!(
            store.list_encrypted_secrets("demo").await.unwrap(),
            vec![EncryptedSecret {
                secret: "s1".to_string(),
                enabled: true
            }]
        );
    }

    #[tokio::test]
    async fn test_create_app_rejects_duplicates() {
        let store = InMemoryStore::new();
        store.create_app(&app("demo", "Demo"), key("demo", "s1")).await.unwrap();

        let err = store
            .create_app(&app("demo", "Other"), key("demo", "s2"))
            .await
            .unwrap_err();
        assert!(err.is_duplicate());

        let err = store
            .create_app(&app("other", "Demo"), key("other", "s2"))
            .await
            .unwrap_err();
        assert!(err.is_duplicate());

        // The failed creations left nothing behind
        assert_eq!(store.count_access_keys("other").await.unwrap(), 0);
        assert_eq!(store.list_apps().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_absence_is_not_an_error() {
        let store = InMemoryStore::new();
        assert!(!store.app_exists("missing").await.unwrap());
        assert!(store.get_app("missing").await.unwrap().is_none());
        assert!(store.list_encrypted_secrets("missing").await.unwrap().is_empty());
        assert!(!store.update_app("missing", &AppUpdate::default()).await.unwrap());
        assert!(!store.delete_app("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_app() {
        let store = InMemoryStore::new();
        store.create_app(&app("a", "A"), key("a", "s1")).await.unwrap();
        store.create_app(&app("b", "B"), key("b", "s2")).await.unwrap();

        let update = AppUpdate {
            name: Some("A2".to_string()),
            description: Some("renamed".to_string()),
        };
        assert!(store.update_app("a", &update).await.unwrap());
        let updated = store.get_app("a").await.unwrap().unwrap();
        assert_eq!(updated.name, "A2");
        assert_eq!(updated.description, "renamed");

        let taken = AppUpdate {
            name: Some("B".to_string()),
            description: None,
        };
        assert!(store.update_app("a", &taken).await.unwrap_err().is_duplicate());
    }

    #[tokio::test]
    async fn test_access_key_lifecycle() {
        let store = InMemoryStore::new();
        let first = store.create_app(&app("demo", "Demo"), key("demo", "s1")).await.unwrap();
        let second = store.create_access_key(key("demo", "s2")).await.unwrap();
        assert_eq!(store.count_access_keys("demo").await.unwrap(), 2);

        assert!(store.update_access_key_enabled("demo", second, false).await.unwrap());
        // Keys of another app are never touched
        assert!(!store.update_access_key_enabled("other", first, false).await.unwrap());
        assert!(!store.delete_access_key("other", first).await.unwrap());

        let keys = store.list_access_keys("demo").await.unwrap();
        assert_eq!(keys.iter().map(|k| k.id).collect::<Vec<_>>(), vec![first, second]);
        assert!(!keys[1].enabled);

        assert!(store.delete_access_key("demo", second).await.unwrap());
        assert_eq!(store.count_access_keys("demo").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_app_removes_its_keys() {
        let store = InMemoryStore::new();
        store.create_app(&app("demo", "Demo"), key("demo", "s1")).await.unwrap();
        store.create_access_key(key("demo", "s2")).await.unwrap();

        assert!(store.delete_app("demo").await.unwrap());
        assert!(!store.app_exists("demo").await.unwrap());
        assert_eq!(store.count_access_keys("demo").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let store = InMemoryStore::new();
        store.set_unavailable(true);

        assert!(store.app_exists("demo").await.unwrap_err().is_connection_error());
        assert!(store.list_encrypted_secrets("demo").await.is_err());
        assert!(store.create_access_key(key("demo", "s1")).await.is_err());

        store.set_unavailable(false);
        assert!(store.app_exists("demo").await.is_ok());
    }

    #[tokio::test]
    async fn test_stats_count_reads_and_writes() {
        let store = InMemoryStore::new();
        store.create_app(&app("demo", "Demo"), key("demo", "s1")).await.unwrap();
        store.app_exists("demo").await.unwrap();
        store.list_encrypted_secrets("demo").await.unwrap();

        assert_eq!(store.stats(), StoreStats { reads: 2, writes: 1 });
    }
}
