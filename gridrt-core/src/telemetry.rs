//! Structured logging setup (§0.A).
//!
//! Grounded in the teacher's `tracing` + `tracing-subscriber` wiring:
//! an `EnvFilter` that defaults to `info` for this workspace's crates,
//! honoring `RUST_LOG` when set.

use tracing_subscriber::EnvFilter;

/// Install a process-wide `tracing` subscriber. Safe to call more than
/// once — later calls are no-ops, matching `tracing`'s own global
/// dispatcher semantics.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gridrt=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Same as [`init_tracing`] but emits newline-delimited JSON, matching the
/// demo binary's production logging format.
pub fn init_tracing_json() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gridrt=info"));
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .try_init();
}
