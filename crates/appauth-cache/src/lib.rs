//! Read-through multi-tier caching.
//!
//! ## Architecture
//!
//! - **L1 (DashMap)**: in-process TTL map, swept by a background janitor
//! - **L2 (Redis)**: shared by every process of a deployment, keys namespaced
//!   as `{prefix}:{cache name}:{key}`
//! - **Pub/Sub**: deletes are broadcast so other processes drop their L1 copy
//!
//! ## Cache Hierarchy
//!
//! ```text
//! NamedCache::get → L1 (DashMap) → L2 (Redis) → Retriever (Store)
//!                       ↓              ↓              ↓
//!                   <1µs latency  ~1ms latency   ~10ms latency
//! ```
//!
//! Values are stored through the [`Codec`]: tagged MessagePack, deflated
//! above a size threshold. Retrieval failures are cached next to values, so
//! a failing source is asked at most once per key per TTL window.
//!
//! ## Graceful Degradation
//!
//! Without Redis a [`BackendProvider::local`] hands out L1-only backends.

pub mod backend;
pub mod codec;
pub mod engine;
pub mod error;
pub mod keys;
pub mod metrics;
pub mod provider;
pub mod pubsub;
pub mod value;

pub use backend::{BackendStats, CacheBackend, CachedEntry, MemoryBackend, RedisBackend};
pub use codec::{Codec, DEFAULT_COMPRESSION_THRESHOLD};
pub use engine::{NamedCache, Retriever};
pub use error::{CacheError, CacheResult};
pub use keys::CacheKey;
pub use provider::{BackendProvider, DEFAULT_JANITOR_INTERVAL};
pub use pubsub::InvalidationListener;
pub use value::CacheValue;
