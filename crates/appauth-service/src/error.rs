//! Service error types.
//!
//! Callers must be able to tell an infrastructure failure (cache, store,
//! cipher) apart from a business-rule rejection. Use
//! [`ServiceError::is_infrastructure`] at the outer boundary to choose between
//! a server error and a client error.

use appauth_cache::CacheError;
use appauth_store::StoreError;

use crate::crypto::CryptoError;

/// Errors returned by the credential services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A business rule rejected the request.
    #[error("Validation error: {message}")]
    Validation {
        /// Description of the violated rule.
        message: String,
    },

    /// The addressed record does not exist.
    #[error("Not found: {entity} {key}")]
    NotFound {
        /// The kind of record.
        entity: String,
        /// The requested key.
        key: String,
    },

    /// A cache lookup failed. A cached store failure arrives here unchanged.
    #[error("[{operation}] {source}")]
    Cache {
        /// Service operation that issued the lookup.
        operation: String,
        #[source]
        source: CacheError,
    },

    /// A store call failed.
    #[error("[{operation}] {source}")]
    Store {
        /// Service operation that issued the call.
        operation: String,
        #[source]
        source: StoreError,
    },

    /// Encrypting or decrypting a secret failed.
    #[error("[{operation}] {source}")]
    Crypto {
        /// Service operation that used the cipher.
        operation: String,
        #[source]
        source: CryptoError,
    },

    /// The service could not be built from its configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },
}

impl ServiceError {
    /// Creates a new `Validation` error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(entity: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            key: key.into(),
        }
    }

    /// Creates a new `Cache` error.
    #[must_use]
    pub fn cache(operation: impl Into<String>, source: CacheError) -> Self {
        Self::Cache {
            operation: operation.into(),
            source,
        }
    }

    /// Creates a new `Store` error. Duplicate keys become validation errors.
    #[must_use]
    pub fn store(operation: impl Into<String>, source: StoreError) -> Self {
        if source.is_duplicate() {
            return Self::validation(source.to_string());
        }
        Self::Store {
            operation: operation.into(),
            source,
        }
    }

    /// Creates a new `Crypto` error.
    #[must_use]
    pub fn crypto(operation: impl Into<String>, source: CryptoError) -> Self {
        Self::Crypto {
            operation: operation.into(),
            source,
        }
    }

    /// Creates a new `Config` error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns `true` for failures of the cache, store, cipher or
    /// configuration, as opposed to a rejected request.
    #[must_use]
    pub fn is_infrastructure(&self) -> bool {
        !matches!(self, Self::Validation { .. } | Self::NotFound { .. })
    }

    /// Returns `true` if a business rule rejected the request.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Returns `true` if the addressed record does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Annotate a store failure so it can be cached by a `NamedCache`.
pub(crate) fn retrieval_error(operation: &str, source: StoreError) -> CacheError {
    CacheError::retrieval("Store", operation, source.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_taxonomy() {
        assert!(!ServiceError::validation("too many secrets").is_infrastructure());
        assert!(!ServiceError::not_found("app", "demo").is_infrastructure());
        assert!(
            ServiceError::store("AppService.get", StoreError::connection_error("refused"))
                .is_infrastructure()
        );
    }

    #[test]
    fn test_duplicate_store_error_is_validation() {
        let err = ServiceError::store("AppService.create", StoreError::duplicate("app", "demo"));
        assert!(err.is_validation());
    }

    #[test]
    fn test_cache_error_is_kept_as_source() {
        let cached = retrieval_error(
            "list_encrypted_secrets",
            StoreError::connection_error("refused"),
        );
        let err = ServiceError::cache("AccessKeyService.verify", cached.clone());

        assert_eq!(
            err.to_string(),
            "[AccessKeyService.verify] [Store:list_encrypted_secrets] Connection error: refused"
        );
        let source = err.source().unwrap().downcast_ref::<CacheError>().unwrap();
        assert_eq!(source, &cached);
    }
}
