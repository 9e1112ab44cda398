//! Tracing setup for binaries and integration tests.

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber: env-filtered, stderr, INFO by default.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
