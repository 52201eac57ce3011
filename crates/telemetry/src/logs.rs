use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Installs the process-wide `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Calling this more
/// than once is harmless: only the first subscriber is kept.
pub fn setup_log_subscriber(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let result = if config.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init()
    };

    if let Err(e) = result {
        debug!("Log subscriber already installed: {}", e);
    }
}
