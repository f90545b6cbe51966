//! Structured logging setup using `tracing`.
//!
//! Everything in the crate logs through `tracing` macros; this module only
//! installs the subscriber. `RUST_LOG` takes precedence over the configured
//! filter.

use tracing_subscriber::EnvFilter;

use crate::config::LogSettings;

/// Build the filter from `RUST_LOG`, falling back to the configured directive
/// and finally to `info` when the directive does not parse.
pub fn build_filter(settings: &LogSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global fmt subscriber on stderr.
///
/// Returns `false` when a subscriber was already installed (tests, embedding
/// applications); that case is not an error.
pub fn init(settings: &LogSettings) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(build_filter(settings))
        .with_writer(std::io::stderr)
        .with_target(settings.with_target)
        .try_init()
        .is_ok()
}
