//! The `auth` module: initialises the auth providers declared on the
//! application context and makes them resolvable.

use std::sync::Arc;

use keel_core::{BoxError, BoxedModule, Module, Priority, async_trait};
use keel_framework::{AppContext, BUILTIN_MODULES, ModuleConfig, ModuleDescriptor, ModuleKind};
use linkme::distributed_slice;

#[distributed_slice(BUILTIN_MODULES)]
static AUTH: ModuleDescriptor = ModuleDescriptor {
    name: "auth",
    kind: ModuleKind::Module,
    factory: AuthModule::create,
    default_config: AuthModule::default_config,
};

pub struct AuthModule {
    app: Arc<AppContext>,
}

impl AuthModule {
    fn create(app: Arc<AppContext>, _config: &ModuleConfig) -> Result<BoxedModule, BoxError> {
        Ok(Arc::new(Self { app }))
    }

    fn default_config() -> ModuleConfig {
        ModuleConfig::active(Priority::new(-950, -950, 950))
    }
}

#[async_trait]
impl Module for AuthModule {
    async fn init(&self) -> Result<(), BoxError> {
        self.app.auth().install_all(&self.app).await
    }
}
