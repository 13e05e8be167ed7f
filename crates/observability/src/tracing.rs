//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Everything at `info`, the StayForge crates at `debug`.
const DEFAULT_DIRECTIVES: &str = "info,stayforge_api=debug,stayforge_booking=debug,\
     stayforge_availability=debug,stayforge_catalog=debug,stayforge_payments=debug,\
     stayforge_messaging=debug,stayforge_mailer=debug,stayforge_infra=debug";

/// Initialize tracing/logging for the process.
///
/// `RUST_LOG` overrides the default filter. Safe to call multiple times
/// (subsequent calls are no-ops).
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    // JSON logs + timestamps, configurable via RUST_LOG.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
