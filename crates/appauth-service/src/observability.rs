//! Tracing setup with a level that `AuthState::build` can change at runtime.

use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

/// Target of audit events (e.g. a disabled secret being presented).
pub const AUDIT_TARGET: &str = "appauth::audit";

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

pub fn init_tracing() {
    init_tracing_with_level("info");
}

/// Install the global subscriber. `RUST_LOG` wins over `level`.
///
/// A second call, or a subscriber installed elsewhere, leaves the existing
/// one in place.
pub fn init_tracing_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter_for(level));

    let (reload_layer, handle) = reload::Layer::new(filter);
    let installed = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer())
        .try_init()
        .is_ok();
    if installed {
        let _ = LOG_RELOAD_HANDLE.set(handle);
    }
}

/// Switch the log level of the subscriber installed by [`init_tracing`].
///
/// Returns `false` when that subscriber is not the one in use.
pub fn apply_logging_level(level: &str) -> bool {
    let Some(handle) = LOG_RELOAD_HANDLE.get() else {
        return false;
    };
    handle.modify(|f| *f = filter_for(level)).is_ok()
}

fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|e| {
        tracing::warn!(level, error = %e, "invalid logging level, using info");
        EnvFilter::new("info")
    })
}
