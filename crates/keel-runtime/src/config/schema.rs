//! Configuration schema.
//!
//! ```toml
//! [app]
//! name = "items-service"
//! stop_timeout_ms = 10000
//!
//! [modules.logger]
//! level = "debug"
//! format = "pretty"
//!
//! [modules.web-server]
//! active = true
//! port = 8080
//! priority = { start = 100 }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use keel_framework::{BUILTIN_MODULES, ModuleConfig};
use serde::{Deserialize, Serialize};

// =============================================================================
// Root
// =============================================================================

/// Root configuration.
///
/// The default value carries the default config of every framework module
/// linked into the binary, so a bare configuration activates the built-ins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeelConfig {
    pub app: AppConfig,
    /// Module name to module config. Iteration order is name order.
    pub modules: BTreeMap<String, ModuleConfig>,
}

impl Default for KeelConfig {
    fn default() -> Self {
        Self {
            app: AppConfig::default(),
            modules: BUILTIN_MODULES
                .iter()
                .map(|d| (d.name.to_string(), (d.default_config)()))
                .collect(),
        }
    }
}

impl KeelConfig {
    pub fn module(&self, name: &str) -> Option<&ModuleConfig> {
        self.modules.get(name)
    }

    /// Active modules in name order.
    pub fn active_modules(&self) -> impl Iterator<Item = (&str, &ModuleConfig)> {
        self.modules
            .iter()
            .filter(|(_, config)| config.active)
            .map(|(name, config)| (name.as_str(), config))
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.app.stop_timeout_ms)
    }
}

/// Application-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application name, used in logs.
    pub name: String,
    /// Budget for the whole stop phase.
    pub stop_timeout_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "keel-app".to_string(),
            stop_timeout_ms: 10_000,
        }
    }
}

// =============================================================================
// Logger module settings
// =============================================================================

/// Settings of the built-in `logger` module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Target file when `output = "file"`.
    pub file_path: Option<PathBuf>,
    pub span_events: SpanEventConfig,
    /// Per-target levels, e.g. `keel_framework = "debug"`.
    pub filters: BTreeMap<String, LogLevel>,
    pub thread_ids: bool,
    /// Include file and line of the call site.
    pub file_location: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Line format. `json` requires the `json-log` feature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    Json,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanEventConfig {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::Priority;

    #[test]
    fn defaults_include_builtin_modules() {
        let config = KeelConfig::default();

        let logger = config.module("logger").unwrap();
        assert!(logger.active);
        assert_eq!(logger.priority, Priority::new(-1000, -1000, 1000));

        let validator = config.module("validator").unwrap();
        assert_eq!(validator.settings["delimiter"], ".");
        assert_eq!(validator.settings["depth_limit"], 10);

        assert_eq!(config.stop_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn logging_settings_read_from_module_config() {
        let module: ModuleConfig = serde_json::from_value(serde_json::json!({
            "active": true,
            "level": "debug",
            "format": "pretty",
            "filters": { "hyper": "warn" }
        }))
        .unwrap();

        let logging: LoggingConfig = module.settings().unwrap();
        assert_eq!(logging.level, LogLevel::Debug);
        assert_eq!(logging.format, LogFormat::Pretty);
        assert_eq!(logging.output, LogOutput::Stdout);
        assert_eq!(logging.filters["hyper"], LogLevel::Warn);
    }
}
