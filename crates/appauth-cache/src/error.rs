//! Cache error types.
//!
//! `CacheError` is cloneable and serializable: a failed retrieval is stored in
//! the cache like any other value and handed back verbatim on later reads.

use serde::{Deserialize, Serialize};

/// Errors produced by the cache engine, its codec and its backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum CacheError {
    /// The retrieval function failed. `layer` and `operation` name where the
    /// failure originated (for example `Store` / `list_encrypted_secrets`).
    #[error("[{layer}:{operation}] {message}")]
    Retrieval {
        /// Layer that produced the failure.
        layer: String,
        /// Operation within that layer.
        operation: String,
        /// Original error message.
        message: String,
    },

    /// The storage backend could not complete an operation.
    #[error("Cache backend error ({operation}): {message}")]
    Backend {
        /// Backend operation that failed (`get`, `set`, `batch_set`, ...).
        operation: String,
        /// Description of the failure.
        message: String,
    },

    /// A value could not be serialized, compressed or decoded.
    #[error("Cache codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// A typed getter could not coerce the cached value.
    #[error("Cache type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Requested type.
        expected: String,
        /// Type actually held by the cache.
        found: String,
    },
}

impl CacheError {
    /// Creates a new `Retrieval` error.
    #[must_use]
    pub fn retrieval(
        layer: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Retrieval {
            layer: layer.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Backend` error.
    #[must_use]
    pub fn backend(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Codec` error.
    #[must_use]
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a new `TypeMismatch` error.
    #[must_use]
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Returns `true` if the error came from the backend or codec rather than
    /// from the retrieval function.
    pub fn is_cache_failure(&self) -> bool {
        matches!(self, Self::Backend { .. } | Self::Codec { .. })
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
