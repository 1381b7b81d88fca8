//! The typed module registry.
//!
//! Module sources live in two search tables. Application modules are
//! registered on the runtime builder and may capture application state;
//! framework modules are the `BUILTIN_MODULES` slice. For every active
//! entry of the resolved configuration the application table is consulted
//! first, the framework table second.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use keel_core::{BoxError, BoxedModule, BoxedServer, Priority};
use keel_framework::{AppContext, ModuleConfig, ModuleKind, builtin_module};
use tracing::{debug, info};

use crate::config::KeelConfig;
use crate::error::{RuntimeError, RuntimeResult};

/// Factory of an application module.
pub type AppModuleFactory =
    Arc<dyn Fn(Arc<AppContext>, &ModuleConfig) -> Result<BoxedModule, BoxError> + Send + Sync>;

struct AppModuleSource {
    kind: ModuleKind,
    factory: AppModuleFactory,
    default_config: ModuleConfig,
}

/// A constructed, checked module instance.
pub struct LoadedModule {
    pub name: String,
    pub kind: ModuleKind,
    pub priority: Priority,
    pub instance: BoxedModule,
    /// Present for server modules.
    pub server: Option<BoxedServer>,
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Application module sources, with the framework table as fallback.
#[derive(Default)]
pub struct ModuleRegistry {
    app: HashMap<String, AppModuleSource>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an application module source.
    ///
    /// `default_config` is layered under user configuration, so a module
    /// registered with an active default runs unless configuration turns
    /// it off.
    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        kind: ModuleKind,
        default_config: ModuleConfig,
        factory: F,
    ) where
        F: Fn(Arc<AppContext>, &ModuleConfig) -> Result<BoxedModule, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.app.insert(
            name.into(),
            AppModuleSource {
                kind,
                factory: Arc::new(factory),
                default_config,
            },
        );
    }

    /// Whether an application source named `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.app.contains_key(name)
    }

    /// The default layer: framework module defaults, then application
    /// module defaults over them.
    pub fn default_config(&self) -> KeelConfig {
        let mut config = KeelConfig::default();
        let app: BTreeMap<_, _> = self
            .app
            .iter()
            .map(|(name, source)| (name.clone(), source.default_config.clone()))
            .collect();
        config.modules.extend(app);
        config
    }

    /// Constructs every active module of `config`, in name order.
    pub fn load(
        &self,
        app: &Arc<AppContext>,
        config: &KeelConfig,
    ) -> RuntimeResult<Vec<LoadedModule>> {
        let mut loaded = Vec::new();

        for (name, module_config) in &config.modules {
            if !module_config.active {
                debug!(module = %name, "module is inactive, skipping");
                continue;
            }
            loaded.push(self.construct(name, app, module_config)?);
        }

        info!(
            modules = ?loaded.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
            "modules loaded"
        );
        Ok(loaded)
    }

    fn construct(
        &self,
        name: &str,
        app: &Arc<AppContext>,
        config: &ModuleConfig,
    ) -> RuntimeResult<LoadedModule> {
        let constructed = if let Some(source) = self.app.get(name) {
            debug!(module = %name, kind = %source.kind, "constructing application module");
            (source.kind, (source.factory)(Arc::clone(app), config))
        } else if let Some(descriptor) = builtin_module(name) {
            debug!(module = %name, kind = %descriptor.kind, "constructing framework module");
            (descriptor.kind, (descriptor.factory)(Arc::clone(app), config))
        } else {
            return Err(RuntimeError::ModuleNotFound {
                name: name.to_string(),
                app_lookup: format!("no application module registered as '{name}'"),
                builtin_lookup: format!("no framework module named '{name}' is linked"),
            });
        };

        let (kind, result) = constructed;
        let instance = result.map_err(|source| RuntimeError::ModuleConstruct {
            name: name.to_string(),
            source,
        })?;

        let server = match kind {
            ModuleKind::Module => None,
            ModuleKind::Server => Some(Arc::clone(&instance).as_server().ok_or_else(|| {
                RuntimeError::ModuleInvalid {
                    name: name.to_string(),
                    reason: "declared as a server module but does not handle requests".into(),
                }
            })?),
        };

        Ok(LoadedModule {
            name: name.to_string(),
            kind,
            priority: config.priority,
            instance,
            server,
        })
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.app.keys().collect();
        names.sort();
        f.debug_struct("ModuleRegistry")
            .field("app", &names)
            .finish()
    }
}
