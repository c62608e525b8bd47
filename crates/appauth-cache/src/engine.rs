//! Read-through cache engine.
//!
//! A [`NamedCache`] binds a backend, the codec and a [`Retriever`]. `get`
//! checks the backend and calls the retriever only on a full miss. The
//! retriever's result is stored with the cache TTL whether it succeeded or
//! failed, so a failing source is asked at most once per key per TTL window
//! and every caller in that window sees the same error.
//!
//! Concurrent misses for the same key are not collapsed: each racing caller
//! runs the retriever and the last write wins. Retrieval is idempotent, so
//! this only costs extra source load during a stampede.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::backend::CacheBackend;
use crate::codec::Codec;
use crate::error::{CacheError, CacheResult};
use crate::keys::CacheKey;
use crate::metrics;

/// Loads the value for a key on a cache miss.
///
/// Implemented for any `Fn(CacheKey) -> impl Future<Output = CacheResult<V>>`.
#[async_trait]
pub trait Retriever<V>: Send + Sync {
    async fn retrieve(&self, key: &CacheKey) -> CacheResult<V>;
}

#[async_trait]
impl<V, F, Fut> Retriever<V> for F
where
    V: Send + 'static,
    F: Fn(CacheKey) -> Fut + Send + Sync,
    Fut: Future<Output = CacheResult<V>> + Send + 'static,
{
    async fn retrieve(&self, key: &CacheKey) -> CacheResult<V> {
        (self)(key.clone()).await
    }
}

/// A stored entry: either a retrieved value or the retrieval failure.
#[derive(Deserialize)]
enum Cached<V> {
    Value(V),
    Failure(CacheError),
}

impl<V> Cached<V> {
    fn into_result(self) -> CacheResult<V> {
        match self {
            Cached::Value(value) => Ok(value),
            Cached::Failure(err) => Err(err),
        }
    }
}

/// Borrowed form of [`Cached`]; encodes identically.
#[derive(Serialize)]
enum CachedRef<'a, V> {
    Value(&'a V),
    Failure(&'a CacheError),
}

impl<'a, V> From<&'a CacheResult<V>> for CachedRef<'a, V> {
    fn from(result: &'a CacheResult<V>) -> Self {
        match result {
            Ok(value) => CachedRef::Value(value),
            Err(err) => CachedRef::Failure(err),
        }
    }
}

/// A cache instance bound to one entity kind.
pub struct NamedCache<V> {
    name: Arc<str>,
    ttl: Duration,
    codec: Codec,
    /// `None` when disabled.
    backend: Option<CacheBackend>,
    retriever: Arc<dyn Retriever<V>>,
}

impl<V> Clone for NamedCache<V> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            ttl: self.ttl,
            codec: self.codec,
            backend: self.backend.clone(),
            retriever: Arc::clone(&self.retriever),
        }
    }
}

impl<V> fmt::Debug for NamedCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedCache")
            .field("name", &self.name)
            .field("ttl", &self.ttl)
            .field("disabled", &self.backend.is_none())
            .finish()
    }
}

impl<V> NamedCache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Create a cache named after `backend` whose entries live for `ttl`.
    pub fn new(backend: CacheBackend, ttl: Duration, retriever: impl Retriever<V> + 'static) -> Self {
        Self {
            name: Arc::from(backend.name()),
            ttl,
            codec: Codec::default(),
            backend: Some(backend),
            retriever: Arc::new(retriever),
        }
    }

    /// Create a disabled cache: every `get` calls the retriever directly and
    /// no other operation touches any storage.
    pub fn disabled(name: &str, ttl: Duration, retriever: impl Retriever<V> + 'static) -> Self {
        Self {
            name: Arc::from(name),
            ttl,
            codec: Codec::default(),
            backend: None,
            retriever: Arc::new(retriever),
        }
    }

    /// Replace the codec (compression threshold).
    #[must_use]
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_disabled(&self) -> bool {
        self.backend.is_none()
    }

    pub fn backend(&self) -> Option<&CacheBackend> {
        self.backend.as_ref()
    }

    /// Read-through lookup.
    ///
    /// Backend failures on the read path are returned to the caller. A cached
    /// retrieval failure is returned as stored.
    pub async fn get(&self, key: &CacheKey) -> CacheResult<V> {
        let Some(backend) = &self.backend else {
            return self.retriever.retrieve(key).await;
        };

        let rendered = key.render();
        if let Some(cached) = self.lookup(backend, &rendered).await? {
            return cached;
        }

        let result = self.retriever.retrieve(key).await;
        if let Err(e) = &result {
            tracing::debug!(cache = %self.name, key = %rendered, error = %e, "caching retrieval failure");
        }

        // The caller gets the retrieved result even if it could not be stored
        if let Err(e) = self.store(backend, &rendered, &result).await {
            tracing::warn!(cache = %self.name, key = %rendered, error = %e, "failed to populate cache");
        }
        result
    }

    /// Overwrite the entry for `key` without calling the retriever.
    pub async fn set(&self, key: &CacheKey, value: V) -> CacheResult<()> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };
        self.store(backend, &key.render(), &Ok(value)).await
    }

    /// Remove the entry for `key` from every tier.
    pub async fn delete(&self, key: &CacheKey) -> CacheResult<()> {
        match &self.backend {
            Some(backend) => backend.delete(&key.render()).await,
            None => Ok(()),
        }
    }

    /// Remove several entries at once.
    pub async fn delete_many(&self, keys: &[CacheKey]) -> CacheResult<()> {
        match &self.backend {
            Some(backend) => backend.batch_delete(&render_all(keys)).await,
            None => Ok(()),
        }
    }

    /// Store several values in one transaction.
    pub async fn set_many(&self, entries: Vec<(CacheKey, V)>) -> CacheResult<()> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };

        let mut encoded = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let result = Ok(value);
            encoded.push((key.render(), self.codec.marshal(&CachedRef::from(&result))?));
        }
        backend.batch_set_transactional(encoded, self.ttl).await
    }

    /// Reset the lifetime of several entries to `ttl` in one transaction.
    pub async fn expire_many(&self, keys: &[CacheKey], ttl: Duration) -> CacheResult<()> {
        match &self.backend {
            Some(backend) => backend.batch_expire_transactional(&render_all(keys), ttl).await,
            None => Ok(()),
        }
    }

    /// Whether an entry (value or cached failure) is present for `key`.
    ///
    /// Backend failures are logged and reported as absent.
    pub async fn exists(&self, key: &CacheKey) -> bool {
        let Some(backend) = &self.backend else {
            return false;
        };

        match backend.get(&key.render()).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                tracing::warn!(cache = %self.name, key = %key, error = %e, "exists check failed");
                false
            }
        }
    }

    /// Read the entry for `key` without populating on a miss.
    ///
    /// `None` means nothing usable is cached; otherwise the cached value or
    /// cached failure is returned.
    pub async fn direct_get(&self, key: &CacheKey) -> Option<CacheResult<V>> {
        let backend = self.backend.as_ref()?;
        match self.lookup(backend, &key.render()).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(cache = %self.name, key = %key, error = %e, "direct get failed");
                None
            }
        }
    }

    /// Read several entries without populating. Keys with nothing usable
    /// cached are absent from the result.
    pub async fn get_many(&self, keys: &[CacheKey]) -> CacheResult<HashMap<CacheKey, CacheResult<V>>> {
        let Some(backend) = &self.backend else {
            return Ok(HashMap::new());
        };

        let rendered = render_all(keys);
        let found = backend.batch_get(&rendered).await?;

        Ok(keys
            .iter()
            .zip(rendered.iter())
            .filter_map(|(key, rendered)| {
                let bytes = found.get(rendered)?;
                self.decode(rendered, bytes)
                    .map(|cached| (key.clone(), cached))
            })
            .collect())
    }

    async fn lookup(&self, backend: &CacheBackend, rendered: &str) -> CacheResult<Option<CacheResult<V>>> {
        Ok(backend
            .get(rendered)
            .await?
            .and_then(|bytes| self.decode(rendered, &bytes)))
    }

    /// Decode a stored entry. Undecodable entries are treated as a miss and
    /// get overwritten by the next population.
    fn decode(&self, rendered: &str, bytes: &[u8]) -> Option<CacheResult<V>> {
        match self.codec.unmarshal::<Cached<V>>(bytes) {
            Ok(cached) => Some(cached.into_result()),
            Err(e) => {
                tracing::warn!(cache = %self.name, key = %rendered, error = %e, "discarding undecodable cache entry");
                metrics::record_backend_error(&self.name, "decode");
                None
            }
        }
    }

    async fn store(&self, backend: &CacheBackend, rendered: &str, result: &CacheResult<V>) -> CacheResult<()> {
        let bytes = self.codec.marshal(&CachedRef::from(result)).inspect_err(|_| {
            metrics::record_backend_error(&self.name, "encode");
        })?;
        backend.set(rendered, bytes, self.ttl).await
    }
}

fn render_all(keys: &[CacheKey]) -> Vec<String> {
    keys.iter().map(CacheKey::render).collect()
}
