//! Logging initialization
//!
//! Builds the tracing subscriber used by the gateway binary. Library code
//! only emits `tracing` events and never installs a subscriber itself.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// The filter defaults to `info` and can be overridden with `RUST_LOG`
/// (e.g. `RUST_LOG=llmserv_rs=debug`). Safe to call once per process.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}
