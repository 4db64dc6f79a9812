//! Tracing subscriber setup for binaries. Library code only emits events;
//! installing a subscriber is the application's call.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global subscriber with `RUST_LOG`-style filtering,
/// defaulting to `info`. Safe to call more than once; later calls are
/// no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
