use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::action::{DispatchResult, Dispatchable};
use crate::config::{LogLevel, LoggerConfig};
use crate::middleware::{Middleware, Next};
use crate::store::StoreApi;

/// Logs every dispatched item through `tracing`.
///
/// Records the kind, the payload (unless disabled), whether the state
/// reference changed and how long the rest of the chain took. Failures are
/// always logged at `warn`.
#[derive(Debug, Clone, Default)]
pub struct LoggerMiddleware {
    config: LoggerConfig,
}

impl LoggerMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &LoggerConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

impl<S: Send + Sync + 'static> Middleware<S> for LoggerMiddleware {
    fn name(&self) -> &'static str {
        "logger"
    }

    fn handle(&self, api: &StoreApi<S>, item: Dispatchable<S>, next: &Next<S>) -> DispatchResult {
        if !self.config.enabled {
            return next.call(item);
        }

        let kind = item.kind().to_string();
        let payload = item
            .as_action()
            .filter(|_| self.config.log_payload)
            .map(|action| action.payload().to_string());
        let before = api.get_state().ok();
        let started = Instant::now();

        let result = next.call(item);

        let elapsed = started.elapsed();
        let changed = match (before, api.get_state().ok()) {
            (Some(before), Some(after)) => !Arc::ptr_eq(&before, &after),
            _ => false,
        };

        match &result {
            Ok(_) => emit(self.config.level, &kind, payload.as_deref(), changed, elapsed),
            Err(err) => tracing::warn!(kind = %kind, error = %err, ?elapsed, "Dispatch failed"),
        }
        result
    }
}

fn emit(level: LogLevel, kind: &str, payload: Option<&str>, changed: bool, elapsed: Duration) {
    match level {
        LogLevel::Trace => tracing::trace!(kind, payload, changed, ?elapsed, "Dispatched"),
        LogLevel::Debug => tracing::debug!(kind, payload, changed, ?elapsed, "Dispatched"),
        LogLevel::Info => tracing::info!(kind, payload, changed, ?elapsed, "Dispatched"),
        LogLevel::Warn => tracing::warn!(kind, payload, changed, ?elapsed, "Dispatched"),
        LogLevel::Error => tracing::error!(kind, payload, changed, ?elapsed, "Dispatched"),
    }
}
