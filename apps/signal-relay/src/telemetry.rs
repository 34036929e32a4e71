//! Tracing Setup
//!
//! Console tracing with `EnvFilter`.
//!
//! # Configuration
//!
//! - `RUST_LOG`: Log level filter (default: `info`)

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber.
///
/// Safe to call more than once; later calls are no-ops (relevant for
/// tests, where multiple harnesses may race to install a subscriber).
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init();
}
