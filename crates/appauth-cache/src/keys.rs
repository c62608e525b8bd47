//! Cache keys.
//!
//! Every lookup goes through one of a small, closed set of key variants. Each
//! variant renders to a canonical string; the cache name is not part of the
//! rendered key because every [`NamedCache`](crate::NamedCache) owns its own key
//! space (and the Redis backend namespaces by cache name).

use std::fmt;

/// A cache key built from structured lookup parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Existence of an app, keyed by app code.
    AppExists { app_code: String },
    /// The full app record, keyed by app code.
    App { app_code: String },
    /// The at-rest secret map of an app, keyed by app code.
    AccessKeys { app_code: String },
    /// A free-form key for ad-hoc caches.
    Plain(String),
}

impl CacheKey {
    pub fn app_exists(app_code: impl Into<String>) -> Self {
        Self::AppExists {
            app_code: app_code.into(),
        }
    }

    pub fn app(app_code: impl Into<String>) -> Self {
        Self::App {
            app_code: app_code.into(),
        }
    }

    pub fn access_keys(app_code: impl Into<String>) -> Self {
        Self::AccessKeys {
            app_code: app_code.into(),
        }
    }

    pub fn plain(key: impl Into<String>) -> Self {
        Self::Plain(key.into())
    }

    /// Render the canonical string used as the backend key.
    pub fn render(&self) -> String {
        match self {
            Self::AppExists { app_code } | Self::App { app_code } | Self::AccessKeys { app_code } => {
                app_code.clone()
            }
            Self::Plain(key) => key.clone(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
