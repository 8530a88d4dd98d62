//! Tracing setup shared by the library and the `poseidon` CLI binary.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs a global `tracing` subscriber driven by `POSEIDON_LOG`
/// (falling back to `info`). Safe to call more than once; later calls are
/// no-ops once a subscriber is already installed.
pub fn init() {
    let filter = EnvFilter::try_from_env("POSEIDON_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
