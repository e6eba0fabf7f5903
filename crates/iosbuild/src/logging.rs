//! Diagnostic logging setup.
//!
//! Progress meant for the user is printed directly; `tracing` events from the
//! SDK go to stderr, filtered by `RUST_LOG` or, when unset, by the verbosity
//! flags.

use iosbuild_sdk::Verbosity;
use tracing_subscriber::EnvFilter;

/// Default filter directive for a verbosity level.
pub fn default_directive(verbosity: Verbosity) -> &'static str {
    match verbosity {
        Verbosity::Quiet => "error",
        Verbosity::Normal => "warn",
        Verbosity::Verbose => "info",
        Verbosity::Debug => "debug",
    }
}

/// Installs the global subscriber. Calling it twice is harmless.
pub fn init(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbosity >= Verbosity::Debug)
        .try_init();
}
