//! Prometheus metrics for credential verification and invalidation.
//!
//! Cache tier metrics are recorded by `appauth-cache`; this module installs
//! the recorder they all report to.

use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names as constants for consistency.
pub mod names {
    pub const ACCESS_KEY_VERIFICATIONS_TOTAL: &str = "access_key_verifications_total";
    pub const CACHE_INVALIDATION_FAILURES_TOTAL: &str = "cache_invalidation_failures_total";
}

/// Outcome of one verification call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    Accepted,
    Rejected,
    /// The secret matched a disabled key.
    Disabled,
    Error,
}

impl VerificationOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationOutcome::Accepted => "accepted",
            VerificationOutcome::Rejected => "rejected",
            VerificationOutcome::Disabled => "disabled",
            VerificationOutcome::Error => "error",
        }
    }
}

/// Install the Prometheus recorder. Returns `false` if already installed or
/// installation failed.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    // Pull-based: the embedding server renders /metrics itself
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("Failed to store Prometheus handle (already set)");
                return false;
            }

            tracing::info!("Prometheus metrics initialized");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            false
        }
    }
}

/// Render metrics in Prometheus text format.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

pub fn record_verification(outcome: VerificationOutcome) {
    counter!(names::ACCESS_KEY_VERIFICATIONS_TOTAL, "outcome" => outcome.as_str()).increment(1);
}

pub fn record_invalidation_failure(cache: &str) {
    counter!(names::CACHE_INVALIDATION_FAILURES_TOTAL, "cache" => cache.to_string()).increment(1);
}
