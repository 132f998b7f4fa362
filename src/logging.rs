use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

use crate::config::{LogLevel, LoggerConfig};

/// Filter directive used when neither `RUST_LOG` nor an explicit filter is set.
pub fn default_filter(config: &LoggerConfig) -> String {
    let level = match config.level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    };
    format!("canopy={level}")
}

/// Install the global fmt subscriber.
///
/// `RUST_LOG` wins over `fallback`. Returns false when a subscriber was
/// already installed.
pub fn init_tracing(fallback: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_timer(UtcTime::rfc_3339())
        .try_init()
        .is_ok()
}
