//! Logging setup for binaries that host a legacy provider.
//!
//! Every operation of [`Provider`](crate::Provider) runs inside a `shim.*`
//! tracing span and reports translation failures, reconciler repairs and
//! pruned state attributes as events. Logs are written to **stderr**. Stdout
//! is left to the host process.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: log filter, e.g. `info` or `hemmer_legacy_provider=debug`
//!
//! ```bash
//! # Log every attribute the upgrader prunes
//! RUST_LOG=hemmer_legacy_provider::upgrade=debug ./my-provider
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_LEVEL: &str = "info";

/// Initialize the global subscriber, defaulting to `info`.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default(DEFAULT_LEVEL);
}

/// Initialize the global subscriber with `default_level` used when
/// `RUST_LOG` is not set.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(stderr_layer())
        .init();
}

/// Try to initialize the global subscriber. Returns `false` if one was
/// already set, which is the usual case in tests.
pub fn try_init_logging() -> bool {
    tracing_subscriber::registry()
        .with(env_filter(DEFAULT_LEVEL))
        .with(stderr_layer())
        .try_init()
        .is_ok()
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
}
