use serde::{Deserialize, Serialize};

/// Root configuration container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logger: LoggerConfig,
}

/// Store behaviour knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Maximum nesting of dispatches started from listeners or middleware
    /// (default: 64).
    #[serde(default = "default_max_dispatch_depth")]
    pub max_dispatch_depth: usize,
    /// Log keys in incoming state that no slice reducer owns (default: true).
    #[serde(default = "default_true")]
    pub warn_unexpected_keys: bool,
}

/// Settings for `LoggerMiddleware`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Level each dispatched item is logged at (default: debug).
    #[serde(default)]
    pub level: LogLevel,
    /// Include the action payload in log records (default: true).
    #[serde(default = "default_true")]
    pub log_payload: bool,
}

/// Verbosity for logged dispatches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    #[default]
    Debug,
    Info,
    Warn,
    Error,
}

fn default_max_dispatch_depth() -> usize {
    64
}

fn default_true() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_dispatch_depth: default_max_dispatch_depth(),
            warn_unexpected_keys: true,
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: LogLevel::default(),
            log_payload: true,
        }
    }
}
