//! The `logger` module: installs the global tracing subscriber.

use std::sync::Arc;

use keel_core::{BoxError, BoxedModule, Module, Priority, async_trait};
use keel_framework::{AppContext, BUILTIN_MODULES, ModuleConfig, ModuleDescriptor, ModuleKind};
use linkme::distributed_slice;
use tracing::{debug, info};

use crate::config::{ConfigError, LoggingConfig};
use crate::logging::LoggingBuilder;

#[distributed_slice(BUILTIN_MODULES)]
static LOGGER: ModuleDescriptor = ModuleDescriptor {
    name: "logger",
    kind: ModuleKind::Module,
    factory: LoggerModule::create,
    default_config: LoggerModule::default_config,
};

pub struct LoggerModule {
    app: Arc<AppContext>,
    settings: LoggingConfig,
}

impl LoggerModule {
    fn create(app: Arc<AppContext>, config: &ModuleConfig) -> Result<BoxedModule, BoxError> {
        let settings = config
            .settings()
            .map_err(|e| ConfigError::invalid_settings("logger", e))?;
        Ok(Arc::new(Self { app, settings }))
    }

    fn default_config() -> ModuleConfig {
        ModuleConfig::active(Priority::new(-1000, -1000, 1000))
    }

    pub fn settings(&self) -> &LoggingConfig {
        &self.settings
    }
}

#[async_trait]
impl Module for LoggerModule {
    async fn init(&self) -> Result<(), BoxError> {
        match LoggingBuilder::from_config(&self.settings).try_init() {
            Ok(()) => info!(
                app = %self.app.name(),
                level = %self.settings.level,
                format = ?self.settings.format,
                "logger initialised"
            ),
            Err(e) => debug!(error = %e, "a global subscriber is already installed, keeping it"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;
    use serde_json::json;

    #[test]
    fn bad_settings_fail_construction() {
        let config = ModuleConfig::active(Priority::default()).with_setting("level", json!("loud"));
        let app = Arc::new(AppContext::new("test"));
        assert!(LoggerModule::create(app, &config).is_err());
    }

    #[tokio::test]
    async fn init_tolerates_existing_subscriber() {
        let config = ModuleConfig::active(Priority::default()).with_setting("level", json!("warn"));
        let app = Arc::new(AppContext::new("test"));

        let first = LoggerModule::create(Arc::clone(&app), &config).unwrap();
        let second = LoggerModule::create(app, &config).unwrap();
        assert!(first.init().await.is_ok());
        assert!(second.init().await.is_ok());
    }

    #[test]
    fn registered_as_builtin() {
        let descriptor = keel_framework::builtin_module("logger").unwrap();
        let config = (descriptor.default_config)();
        assert!(config.active);
        assert_eq!(config.priority.stop, 1000);
        let settings: LoggingConfig = config.settings().unwrap();
        assert_eq!(settings.level, LogLevel::Info);
    }
}
