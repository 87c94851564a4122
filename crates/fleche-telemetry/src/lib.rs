//! Tracing setup for the fleche server.
//!
//! Call [`init_telemetry`] once at startup. The returned guard keeps the
//! runtime per-module level overrides; tests and the RPC surface can adjust
//! them without restarting the process.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::Level;
use tracing_subscriber::{EnvFilter, Layer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by the RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "fleche_engine" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit JSON lines instead of human-readable output.
    pub json_output: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json_output: false,
        }
    }
}

/// Guard holding the runtime level overrides.
pub struct TelemetryGuard {
    level_filter: Arc<RwLock<Vec<(String, Level)>>>,
}

impl TelemetryGuard {
    /// Change the log level for a specific module at runtime.
    pub fn set_module_level(&self, module: &str, level: Level) {
        let mut levels = self.level_filter.write();
        if let Some(entry) = levels.iter_mut().find(|(m, _)| m == module) {
            entry.1 = level;
        } else {
            levels.push((module.to_string(), level));
        }
    }

    /// Current per-module log level overrides.
    pub fn module_levels(&self) -> Vec<(String, Level)> {
        self.level_filter.read().clone()
    }
}

/// Build the env-filter directive string for a config.
fn filter_directives(config: &TelemetryConfig) -> String {
    let mut filter = config.log_level.to_string().to_lowercase();
    for (module, level) in &config.module_levels {
        filter.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
    }
    filter
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let level_filter = Arc::new(RwLock::new(config.module_levels.clone()));

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(&config)));

    if config.json_output {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_filter(env_filter);
        tracing_subscriber::registry().with(fmt_layer).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(env_filter);
        tracing_subscriber::registry().with(fmt_layer).init();
    }

    TelemetryGuard { level_filter }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_info() {
        let config = TelemetryConfig::default();
        assert_eq!(config.log_level, Level::INFO);
        assert!(config.module_levels.is_empty());
    }

    #[test]
    fn filter_includes_module_overrides() {
        let config = TelemetryConfig {
            log_level: Level::INFO,
            module_levels: vec![("fleche_engine".into(), Level::DEBUG)],
            json_output: false,
        };
        assert_eq!(filter_directives(&config), "info,fleche_engine=debug");
    }

    #[test]
    fn guard_tracks_level_changes() {
        let guard = TelemetryGuard {
            level_filter: Arc::new(RwLock::new(Vec::new())),
        };
        guard.set_module_level("fleche_store", Level::TRACE);
        assert_eq!(guard.module_levels(), vec![("fleche_store".to_string(), Level::TRACE)]);

        guard.set_module_level("fleche_store", Level::WARN);
        assert_eq!(guard.module_levels(), vec![("fleche_store".to_string(), Level::WARN)]);
    }
}
