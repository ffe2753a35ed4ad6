//! Logging initialization.
//!
//! The library itself emits through the `log` facade; this module wires
//! those records into `tracing` for applications that want structured
//! output. Call once at process start — the library never initializes
//! logging on its own.

use tracing_log::LogTracer;
use tracing_subscriber::EnvFilter;

/// Installs the tracing subscriber with the filter taken from `RUST_LOG`
/// (defaulting to `info`) and bridges `log` records into it.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    init_with_filter(None);
}

/// Like [`init`] but with an explicit filter directive, e.g. `"fam=debug"`.
pub fn init_with_filter(filter: Option<&str>) {
    let env_filter = match filter {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let _ = LogTracer::init();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();

    tracing::debug!("Logging initialized");
}
