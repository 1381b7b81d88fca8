//! Module descriptors and the framework-default module table.
//!
//! A module source is a factory plus metadata. Framework crates contribute
//! their built-in modules to [`BUILTIN_MODULES`] with
//! `#[distributed_slice(BUILTIN_MODULES)]`; applications register their own
//! sources on the runtime builder, which consults them first.

use std::fmt;
use std::sync::Arc;

use keel_core::{BoxError, BoxedModule, Priority};
use linkme::distributed_slice;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::AppContext;

// =============================================================================
// ModuleConfig
// =============================================================================

/// Resolved configuration of one module.
///
/// `active` and `priority` are interpreted by the runtime; every other key is
/// module-specific and read with [`ModuleConfig::settings`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    #[serde(default, alias = "moduleIsActive")]
    pub active: bool,

    #[serde(default)]
    pub priority: Priority,

    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl ModuleConfig {
    /// An active config with the given priorities and no settings.
    pub fn active(priority: Priority) -> Self {
        Self {
            active: true,
            priority,
            settings: Map::new(),
        }
    }

    /// An inactive config with the given priorities.
    pub fn inactive(priority: Priority) -> Self {
        Self {
            active: false,
            ..Self::active(priority)
        }
    }

    /// Adds one setting.
    pub fn with_setting(mut self, key: impl Into<String>, value: Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    /// Deserialises the module-specific settings into `T`.
    pub fn settings<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.settings.clone()))
    }
}

// =============================================================================
// Descriptors
// =============================================================================

/// The capability set a module source promises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// init / start / stop.
    Module,
    /// init / start / stop plus request handling.
    Server,
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleKind::Module => f.write_str("module"),
            ModuleKind::Server => f.write_str("server"),
        }
    }
}

/// Constructs a module from the application context and its config.
pub type ModuleFactory = fn(Arc<AppContext>, &ModuleConfig) -> Result<BoxedModule, BoxError>;

/// A framework-default module source.
pub struct ModuleDescriptor {
    pub name: &'static str,
    pub kind: ModuleKind,
    pub factory: ModuleFactory,
    /// Settings merged under user configuration.
    pub default_config: fn() -> ModuleConfig,
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Framework-default modules, the fallback search table.
#[distributed_slice]
pub static BUILTIN_MODULES: [ModuleDescriptor];

/// Looks up a framework-default module by name.
pub fn builtin_module(name: &str) -> Option<&'static ModuleDescriptor> {
    BUILTIN_MODULES.iter().find(|d| d.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct ServerSettings {
        port: u16,
    }

    #[test]
    fn legacy_active_flag_is_accepted() {
        let config: ModuleConfig = serde_json::from_value(json!({
            "moduleIsActive": true,
            "priority": { "stop": 5 },
            "port": 9000
        }))
        .unwrap();

        assert!(config.active);
        assert_eq!(config.priority, Priority::new(0, 0, 5));
        assert_eq!(
            config.settings::<ServerSettings>().unwrap(),
            ServerSettings { port: 9000 }
        );
    }

    #[test]
    fn absent_flag_means_inactive() {
        let config: ModuleConfig = serde_json::from_value(json!({})).unwrap();
        assert!(!config.active);
    }
}
