//! Optional `tracing-subscriber` bootstrap for binaries embedding this
//! engine. The engine itself only emits `tracing` events; it never installs
//! a global subscriber, so a host that already has its own logging stack
//! can ignore this module entirely.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs a subscriber reading its filter from `RUST_LOG`, defaulting to
/// `info` when unset. Call at most once, from `main`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(true).init();
}
