//! Store collaborator for app credentials.
//!
//! Defines the records the credential subsystem reads and writes, the
//! [`AppStore`] / [`AccessKeyStore`] traits any database backend implements,
//! and [`InMemoryStore`] for development and tests.
//!
//! Secrets only ever appear here in their at-rest (encrypted) form.

pub mod error;
pub mod memory;
pub mod traits;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryStore, StoreStats};
pub use traits::{AccessKeyStore, AppStore, Store};
pub use types::{AccessKey, AppRecord, AppUpdate, EncryptedSecret, NewAccessKey};

/// Type alias for a shareable store instance.
pub type DynStore = std::sync::Arc<dyn Store>;
