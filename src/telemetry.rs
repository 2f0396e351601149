//! Logging setup for processes embedding the autoscaler

use tracing_subscriber::EnvFilter;

/// Default filter for a verbosity level
pub fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install a global fmt subscriber.
///
/// `RUST_LOG` overrides the verbosity-derived filter. Returns false when a
/// subscriber was already installed.
pub fn init_logging(verbosity: u8) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity))),
        )
        .try_init()
        .is_ok()
}
