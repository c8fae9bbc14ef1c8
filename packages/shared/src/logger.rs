//! Logger setup shared by Hiroba binaries.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Build the default filter directive for a binary.
///
/// Binary names use `-` while tracing targets use `_`, so the name is normalised
/// before being used as a target.
pub fn default_directive(bin_name: &str, level: &str) -> String {
    format!("{}={},tower_http=debug", bin_name.replace('-', "_"), level)
}

/// Initialise the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_level` when it is set.
pub fn setup_logger(bin_name: &str, default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(bin_name, default_level)));

    // try_init so that tests or embedding binaries can install their own subscriber first
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init();
}
