//! Tracing subscriber setup for binaries and examples.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global subscriber: compact fmt output filtered by
/// `RUST_LOG`, defaulting to `info`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}
