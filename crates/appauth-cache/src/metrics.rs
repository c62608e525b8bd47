//! Cache metrics.
//!
//! Counters are recorded through the `metrics` facade; the exporter is
//! installed by the binary that embeds the cache.

use metrics::{counter, gauge};

/// Metric names as constants for consistency.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_ENTRIES: &str = "cache_entries";
    pub const CACHE_BACKEND_ERRORS_TOTAL: &str = "cache_backend_errors_total";
    pub const CACHE_EVICTIONS_TOTAL: &str = "cache_evictions_total";
}

/// Record a cache hit on the given tier (`L1` or `L2`).
pub fn record_cache_hit(cache: &str, tier: &'static str) {
    counter!(names::CACHE_HITS_TOTAL, "cache" => cache.to_string(), "tier" => tier).increment(1);
}

/// Record a cache miss (all tiers missed).
pub fn record_cache_miss(cache: &str) {
    counter!(names::CACHE_MISSES_TOTAL, "cache" => cache.to_string()).increment(1);
}

/// Record a failed backend operation.
pub fn record_backend_error(cache: &str, operation: &'static str) {
    counter!(
        names::CACHE_BACKEND_ERRORS_TOTAL,
        "cache" => cache.to_string(),
        "operation" => operation
    )
    .increment(1);
}

/// Record entries removed by the local janitor.
pub fn record_evictions(cache: &str, count: usize) {
    counter!(names::CACHE_EVICTIONS_TOTAL, "cache" => cache.to_string()).increment(count as u64);
}

/// Set the number of local (L1) entries.
pub fn set_cache_entries(cache: &str, count: usize) {
    gauge!(names::CACHE_ENTRIES, "cache" => cache.to_string()).set(count as f64);
}
