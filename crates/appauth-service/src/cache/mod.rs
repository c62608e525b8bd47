//! Domain caches and their invalidation.
//!
//! ```text
//! verify / exists / get → CacheRegistry → NamedCache → Store (on miss)
//! create / update / delete → Store → InvalidationCoordinator → NamedCache::delete
//! ```

pub mod invalidation;
pub mod registry;

pub use invalidation::InvalidationCoordinator;
pub use registry::{AccessKeySecretMap, CacheRegistry, names};
