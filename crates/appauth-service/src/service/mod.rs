//! App and access key services.
//!
//! Reads go through the domain caches. Writes go to the store, then call the
//! invalidation coordinator before returning.

pub mod access_key;
pub mod app;

pub use access_key::{AccessKeyService, ListedAccessKey, PlainAccessKey};
pub use app::AppService;
