//! The `validator` module: installs the [`Validator`] capability.

use std::sync::Arc;

use keel_core::{BoxError, BoxedModule, Module, Priority, async_trait};
use keel_framework::{
    AppContext, BUILTIN_MODULES, ModuleConfig, ModuleDescriptor, ModuleKind, Validator,
};
use linkme::distributed_slice;
use serde_json::json;
use tracing::debug;

use crate::config::ConfigError;

#[distributed_slice(BUILTIN_MODULES)]
static VALIDATOR: ModuleDescriptor = ModuleDescriptor {
    name: "validator",
    kind: ModuleKind::Module,
    factory: ValidatorModule::create,
    default_config: ValidatorModule::default_config,
};

pub struct ValidatorModule {
    app: Arc<AppContext>,
    validator: Validator,
}

impl ValidatorModule {
    fn create(app: Arc<AppContext>, config: &ModuleConfig) -> Result<BoxedModule, BoxError> {
        let validator = config
            .settings()
            .map_err(|e| ConfigError::invalid_settings("validator", e))?;
        Ok(Arc::new(Self { app, validator }))
    }

    fn default_config() -> ModuleConfig {
        let defaults = Validator::default();
        ModuleConfig::active(Priority::new(-990, -990, 990))
            .with_setting("delimiter", json!(defaults.delimiter))
            .with_setting("depth_limit", json!(defaults.depth_limit))
    }
}

#[async_trait]
impl Module for ValidatorModule {
    async fn init(&self) -> Result<(), BoxError> {
        self.app.install_validator(self.validator.clone())?;
        debug!(
            delimiter = %self.validator.delimiter,
            depth_limit = self.validator.depth_limit,
            "validator installed"
        );
        Ok(())
    }
}
