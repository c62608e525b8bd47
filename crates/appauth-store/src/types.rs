//! Domain types for apps and their access keys.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A registered application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRecord {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tenant_mode: String,
    #[serde(default)]
    pub tenant_id: String,
}

/// Partial update of an app. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl AppUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

/// An access key as stored: the secret is always in its at-rest form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKey {
    pub id: i64,
    pub app_code: String,
    /// At-rest (encrypted) secret.
    pub app_secret: String,
    pub enabled: bool,
    /// System that created the key.
    pub created_source: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A new access key to insert. The store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccessKey {
    pub app_code: String,
    /// At-rest (encrypted) secret.
    pub app_secret: String,
    pub enabled: bool,
    pub created_source: String,
}

/// At-rest secret and its enabled flag, as needed for verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    pub secret: String,
    pub enabled: bool,
}

impl From<&AccessKey> for EncryptedSecret {
    fn from(key: &AccessKey) -> Self {
        Self {
            secret: key.app_secret.clone(),
            enabled: key.enabled,
        }
    }
}
