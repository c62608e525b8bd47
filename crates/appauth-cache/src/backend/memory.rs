//! Process-local (L1) tier: a TTL map swept by a background janitor.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::metrics;

/// A cached entry with TTL support.
///
/// The data is wrapped in `Arc` so hits hand out a reference-counted view
/// instead of copying the payload.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: Arc<Vec<u8>>,
    pub expires_at: Instant,
}

impl CachedEntry {
    /// Create a new cached entry expiring `ttl` from now.
    pub fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self::from_shared(Arc::new(data), ttl)
    }

    pub fn from_shared(data: Arc<Vec<u8>>, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: expiry_after(ttl),
        }
    }

    /// Check if this entry has expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Instant::now()
    }
}

/// In-memory backend for a single named cache.
///
/// Expired entries are invisible to readers immediately but are only removed
/// by [`MemoryBackend::cleanup_expired`], normally driven by the janitor task
/// started with [`MemoryBackend::spawn_janitor`]. Reads never sweep.
#[derive(Clone)]
pub struct MemoryBackend {
    name: Arc<str>,
    entries: Arc<DashMap<String, CachedEntry>>,
}

impl MemoryBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            entries: Arc::new(DashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| Arc::clone(&entry.data))
    }

    pub fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        self.entries
            .insert(key.to_string(), CachedEntry::new(value, ttl));
    }

    pub fn set_shared(&self, key: &str, value: Arc<Vec<u8>>, ttl: Duration) {
        self.entries
            .insert(key.to_string(), CachedEntry::from_shared(value, ttl));
    }

    pub fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn batch_delete(&self, keys: &[String]) {
        for key in keys {
            self.entries.remove(key);
        }
    }

    pub fn batch_get(&self, keys: &[String]) -> HashMap<String, Arc<Vec<u8>>> {
        keys.iter()
            .filter_map(|key| self.get(key).map(|data| (key.clone(), data)))
            .collect()
    }

    /// Insert every entry with one shared expiry.
    ///
    /// Atomicity is per key: a concurrent reader in this process may observe
    /// part of the group. Cross-process atomicity is the job of the Redis tier.
    pub fn batch_set(&self, entries: Vec<(String, Vec<u8>)>, ttl: Duration) {
        let expires_at = expiry_after(ttl);
        for (key, value) in entries {
            let entry = CachedEntry {
                data: Arc::new(value),
                expires_at,
            };
            self.entries.insert(key, entry);
        }
    }

    /// Reset the expiration of every live key in `keys`. Missing or already
    /// expired keys are left alone.
    pub fn batch_expire(&self, keys: &[String], ttl: Duration) {
        let expires_at = expiry_after(ttl);
        for key in keys {
            if let Some(mut entry) = self.entries.get_mut(key) {
                if !entry.is_expired() {
                    entry.expires_at = expires_at;
                }
            }
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove expired entries. Returns the number of entries removed.
    ///
    /// Expired keys are collected first and removed one at a time, so a
    /// concurrent writer is only ever held up by a single-key removal. A key
    /// rewritten between collection and removal is kept.
    pub fn cleanup_expired(&self) -> usize {
        sweep(&self.name, &self.entries)
    }

    /// Start the janitor sweeping this backend every `interval`.
    ///
    /// The task holds only a weak reference and exits once every clone of the
    /// backend has been dropped.
    pub fn spawn_janitor(&self, interval: Duration) -> JoinHandle<()> {
        let name = Arc::clone(&self.name);
        let weak: Weak<DashMap<String, CachedEntry>> = Arc::downgrade(&self.entries);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let Some(entries) = weak.upgrade() else {
                    tracing::debug!(cache = %name, "cache dropped, janitor exiting");
                    break;
                };

                let removed = sweep(&name, &entries);
                if removed > 0 {
                    tracing::debug!(cache = %name, removed, "janitor evicted expired entries");
                }
            }
        })
    }
}

/// Far enough ahead to never expire while the process runs.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `now + ttl`, saturating for TTLs the platform clock cannot represent.
///
/// A clock that cannot reach [`FAR_FUTURE`] either makes the entry expire
/// immediately, which degrades to a cache miss.
fn expiry_after(ttl: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

fn sweep(name: &str, entries: &DashMap<String, CachedEntry>) -> usize {
    let expired: Vec<String> = entries
        .iter()
        .filter(|entry| entry.is_expired())
        .map(|entry| entry.key().clone())
        .collect();

    let mut removed = 0;
    for key in expired {
        if entries.remove_if(&key, |_, entry| entry.is_expired()).is_some() {
            removed += 1;
        }
    }

    if removed > 0 {
        metrics::record_evictions(name, removed);
    }
    metrics::set_cache_entries(name, entries.len());

    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let backend = MemoryBackend::new("test");
        backend.set("a", b"1".to_vec(), Duration::from_secs(60));

        assert_eq!(backend.get("a"), Some(Arc::new(b"1".to_vec())));

        backend.delete("a");
        assert!(backend.get("a").is_none());
        // Deleting a missing key is fine
        backend.delete("a");
    }

    #[tokio::test]
    async fn test_expired_entry_is_invisible_but_kept_until_sweep() {
        let backend = MemoryBackend::new("test");
        backend.set("a", b"1".to_vec(), Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(backend.get("a").is_none());
        assert_eq!(backend.len(), 1);

        assert_eq!(backend.cleanup_expired(), 1);
        assert!(backend.is_empty());
    }

    #[test]
    fn test_batch_operations() {
        let backend = MemoryBackend::new("test");
        backend.batch_set(
            vec![
                ("a".to_string(), b"1".to_vec()),
                ("b".to_string(), b"2".to_vec()),
            ],
            Duration::from_secs(60),
        );

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let found = backend.batch_get(&keys);
        assert_eq!(found.len(), 2);
        assert_eq!(found["b"], Arc::new(b"2".to_vec()));

        backend.batch_delete(&keys);
        assert!(backend.batch_get(&keys).is_empty());
    }

    #[tokio::test]
    async fn test_batch_set_entries_expire_together() {
        let backend = MemoryBackend::new("test");
        let entries = (0..64)
            .map(|i| (format!("k{i}"), vec![i as u8]))
            .collect::<Vec<_>>();
        backend.batch_set(entries, Duration::from_millis(10));

        let expiries = backend
            .entries
            .iter()
            .map(|entry| entry.expires_at)
            .collect::<std::collections::HashSet<_>>();
        assert_eq!(expiries.len(), 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.cleanup_expired(), 64);
    }

    #[tokio::test]
    async fn test_batch_expire_shortens_ttl() {
        let backend = MemoryBackend::new("test");
        backend.set("a", b"1".to_vec(), Duration::from_secs(60));

        backend.batch_expire(&["a".to_string(), "missing".to_string()], Duration::from_millis(10));
        assert!(backend.get("a").is_some());
        assert!(backend.get("missing").is_none());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(backend.get("a").is_none());
    }

    #[test]
    fn test_huge_ttl_saturates_instead_of_overflowing() {
        let backend = MemoryBackend::new("test");
        backend.set("a", b"1".to_vec(), Duration::MAX);
        backend.set_shared("b", Arc::new(b"2".to_vec()), Duration::from_secs(u64::MAX));

        assert!(backend.get("a").is_some());
        assert!(backend.get("b").is_some());

        backend.batch_expire(&["a".to_string()], Duration::MAX);
        assert!(backend.get("a").is_some());
        assert_eq!(backend.cleanup_expired(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_live_entries() {
        let backend = MemoryBackend::new("test");
        backend.set("short", b"1".to_vec(), Duration::from_millis(10));
        backend.set("long", b"2".to_vec(), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(backend.cleanup_expired(), 1);
        assert_eq!(backend.len(), 1);
        assert!(backend.get("long").is_some());
    }

    #[tokio::test]
    async fn test_janitor_sweeps_in_background() {
        let backend = MemoryBackend::new("test");
        let janitor = backend.spawn_janitor(Duration::from_millis(20));

        backend.set("a", b"1".to_vec(), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(backend.is_empty());

        drop(backend);
        tokio::time::timeout(Duration::from_secs(1), janitor)
            .await
            .expect("janitor should exit once the backend is dropped")
            .unwrap();
    }
}
