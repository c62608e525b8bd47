//! Dynamically typed cache values.
//!
//! Domain caches are statically typed (`NamedCache<bool>`, `NamedCache<AppRecord>`,
//! ...). `NamedCache<CacheValue>` is for ad-hoc caches whose retriever may
//! return one of a few scalar kinds; its typed getters fail with
//! [`CacheError::TypeMismatch`] instead of coercing silently.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::engine::NamedCache;
use crate::error::{CacheError, CacheResult};
use crate::keys::CacheKey;

/// A scalar value held by a dynamically typed cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheValue {
    String(String),
    Bool(bool),
    Int64(i64),
    Time(#[serde(with = "time::serde::rfc3339")] OffsetDateTime),
}

impl CacheValue {
    /// Name of the held kind, used in mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheValue::String(_) => "string",
            CacheValue::Bool(_) => "bool",
            CacheValue::Int64(_) => "int64",
            CacheValue::Time(_) => "time",
        }
    }
}

impl From<String> for CacheValue {
    fn from(value: String) -> Self {
        CacheValue::String(value)
    }
}

impl From<&str> for CacheValue {
    fn from(value: &str) -> Self {
        CacheValue::String(value.to_string())
    }
}

impl From<bool> for CacheValue {
    fn from(value: bool) -> Self {
        CacheValue::Bool(value)
    }
}

impl From<i64> for CacheValue {
    fn from(value: i64) -> Self {
        CacheValue::Int64(value)
    }
}

impl From<OffsetDateTime> for CacheValue {
    fn from(value: OffsetDateTime) -> Self {
        CacheValue::Time(value)
    }
}

impl NamedCache<CacheValue> {
    pub async fn get_string(&self, key: &CacheKey) -> CacheResult<String> {
        match self.get(key).await? {
            CacheValue::String(value) => Ok(value),
            other => Err(CacheError::type_mismatch("string", other.kind())),
        }
    }

    pub async fn get_bool(&self, key: &CacheKey) -> CacheResult<bool> {
        match self.get(key).await? {
            CacheValue::Bool(value) => Ok(value),
            other => Err(CacheError::type_mismatch("bool", other.kind())),
        }
    }

    pub async fn get_int64(&self, key: &CacheKey) -> CacheResult<i64> {
        match self.get(key).await? {
            CacheValue::Int64(value) => Ok(value),
            other => Err(CacheError::type_mismatch("int64", other.kind())),
        }
    }

    pub async fn get_time(&self, key: &CacheKey) -> CacheResult<OffsetDateTime> {
        match self.get(key).await? {
            CacheValue::Time(value) => Ok(value),
            other => Err(CacheError::type_mismatch("time", other.kind())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CacheBackend;
    use std::time::Duration;

    async fn by_key(key: CacheKey) -> CacheResult<CacheValue> {
        match key.render().as_str() {
            "name" => Ok("demo".into()),
            "enabled" => Ok(true.into()),
            "count" => Ok(42i64.into()),
            "created" => Ok(OffsetDateTime::from_unix_timestamp(1_700_000_000)
                .map_err(|e| CacheError::retrieval("Test", "created", e.to_string()))?
                .into()),
            other => Err(CacheError::retrieval("Test", "by_key", format!("no value for {other}"))),
        }
    }

    #[tokio::test]
    async fn test_typed_getters() {
        let cache = NamedCache::new(
            CacheBackend::new_local("values"),
            Duration::from_secs(60),
            by_key,
        );

        assert_eq!(cache.get_string(&CacheKey::plain("name")).await.unwrap(), "demo");
        assert!(cache.get_bool(&CacheKey::plain("enabled")).await.unwrap());
        assert_eq!(cache.get_int64(&CacheKey::plain("count")).await.unwrap(), 42);
        assert_eq!(
            cache
                .get_time(&CacheKey::plain("created"))
                .await
                .unwrap()
                .unix_timestamp(),
            1_700_000_000
        );
    }

    #[tokio::test]
    async fn test_typed_getter_mismatch() {
        let cache = NamedCache::new(
            CacheBackend::new_local("values"),
            Duration::from_secs(60),
            by_key,
        );

        let err = cache.get_bool(&CacheKey::plain("name")).await.unwrap_err();
        assert_eq!(err, CacheError::type_mismatch("bool", "string"));

        // The cached value itself is untouched
        assert_eq!(cache.get_string(&CacheKey::plain("name")).await.unwrap(), "demo");
    }

    #[tokio::test]
    async fn test_typed_getter_on_disabled_cache_fails_immediately() {
        let cache = NamedCache::disabled("values", Duration::from_secs(60), by_key);

        assert!(matches!(
            cache.get_time(&CacheKey::plain("count")).await,
            Err(CacheError::TypeMismatch { .. })
        ));
        assert!(matches!(
            cache.get_string(&CacheKey::plain("missing")).await,
            Err(CacheError::Retrieval { .. })
        ));
    }
}
