//! Configuration loader using figment.
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: enables TOML configuration files (`keel.toml`, `config.toml`)
//! - `yaml-config`: enables YAML configuration files (`keel.yaml`, `keel.yml`, etc.)
//!
//! Both features can be enabled simultaneously; if so, both file formats are searched and loaded.
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults, including every framework module's default config
//! 2. Profile-specific config file (`keel.{profile}.toml` / `keel.{profile}.yaml`)
//! 3. Main config file (`keel.toml` / `keel.yaml`)
//! 4. Environment variables (`KEEL_*`)
//! 5. Programmatic overrides
//!
//! # Environment Variable Mapping
//!
//! Environment variables are mapped using the `KEEL_` prefix with `__` as separator:
//!
//! - `KEEL_APP__NAME=items` → `app.name = "items"`
//! - `KEEL_APP__STOP_TIMEOUT_MS=5000` → `app.stop_timeout_ms = 5000`
//! - `KEEL_MODULES__LOGGER__LEVEL=debug` → `modules.logger.level = "debug"`
//!
//! Keys are lower-cased, so module names containing `-` cannot be reached
//! from the environment.
//!
//! # Example
//!
//! ```rust,ignore
//! use keel_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .set("modules.web-server.active", true)
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::KeelConfig;
use super::validation::validate_config;

const LEGACY_ACTIVE_KEY: &str = "moduleIsActive";

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    /// Development profile (default).
    #[default]
    Development,
    /// Production profile.
    Production,
    /// Custom profile name.
    Custom(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name; `prod` and `dev` are accepted as short forms.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `KEEL_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var("KEEL_PROFILE")
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    /// Lowest layer.
    defaults: KeelConfig,
    /// Programmatic overrides, merged last.
    overrides: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    /// Specific config file to load (overrides search).
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            defaults: KeelConfig::default(),
            overrides: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Profile::parse(&profile.into());
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds current directory to search paths.
    pub fn with_current_dir(self) -> Self {
        if let Ok(cwd) = std::env::current_dir() {
            self.search_path(cwd)
        } else {
            self
        }
    }

    /// Adds user config directory to search paths.
    pub fn with_user_config_dir(self) -> Self {
        if let Some(config_dir) = dirs::config_dir() {
            self.search_path(config_dir.join("keel"))
        } else {
            self
        }
    }

    /// Sets a specific configuration file to load.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables loading environment variables (default: true).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Replaces the default layer.
    ///
    /// The runtime uses this to add the default configs of application
    /// modules next to the framework ones.
    pub fn defaults(mut self, defaults: KeelConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Merges a (partial) configuration value over every other source.
    ///
    /// ```rust,ignore
    /// let config = ConfigLoader::new()
    ///     .merge(serde_json::json!({ "app": { "stop_timeout_ms": 2000 } }))
    ///     .load()?;
    /// ```
    pub fn merge<T: Serialize>(mut self, value: T) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(value));
        self
    }

    /// Overrides a single dotted key, e.g. `"modules.logger.level"`.
    pub fn set<T: Serialize>(mut self, key: &str, value: T) -> Self {
        self.overrides = self.overrides.merge(Serialized::default(key, value));
        self
    }

    /// Loads, extracts and validates the configuration.
    pub fn load(self) -> ConfigResult<KeelConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;

        let config: KeelConfig = figment.extract()?;
        validate_config(&config)?;

        debug!(
            profile = %profile,
            app = %config.app.name,
            modules = config.active_modules().count(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Builds the figment instance with all sources.
    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(self.defaults.clone()));

        if let Some(path) = self.config_file.take() {
            if path.exists() {
                info!(path = %path.display(), "Loading configuration file");
                figment = Self::merge_config_file(figment, &path)?;
            } else {
                return Err(ConfigError::FileNotFound(path));
            }
        } else {
            figment = self.load_config_files(figment);
        }
        figment = Self::rename_legacy_keys(figment)?;

        if self.load_env {
            trace!("Loading environment variables with KEEL_ prefix");
            figment = figment.merge(Env::prefixed("KEEL_").ignore(&["profile"]).split("__"));
        }

        let overrides = std::mem::take(&mut self.overrides);
        Ok(figment.merge(overrides))
    }

    /// Rewrites `modules.<name>.moduleIsActive` to `active`.
    ///
    /// Module defaults already carry `active`, and a table holding both keys
    /// fails to extract, so the legacy flag replaces it here. Later sources
    /// (environment, overrides) still win.
    fn rename_legacy_keys(figment: Figment) -> ConfigResult<Figment> {
        let mut value: serde_json::Value = figment.extract()?;
        let Some(modules) = value.get_mut("modules").and_then(|m| m.as_object_mut()) else {
            return Ok(figment);
        };

        let mut renamed = false;
        for (name, module) in modules.iter_mut() {
            let Some(table) = module.as_object_mut() else {
                continue;
            };
            if let Some(flag) = table.remove(LEGACY_ACTIVE_KEY) {
                debug!(module = %name, "Renaming legacy {LEGACY_ACTIVE_KEY} key");
                table.insert("active".to_string(), flag);
                renamed = true;
            }
        }

        if renamed {
            Ok(Figment::from(Serialized::defaults(value)))
        } else {
            Ok(figment)
        }
    }

    /// Merges a single config file into the figment, dispatching on file extension.
    ///
    /// Only extensions enabled via feature flags are accepted.
    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
        }
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if self.search_paths.is_empty() {
            let mut paths = Vec::new();
            if let Ok(cwd) = std::env::current_dir() {
                paths.push(cwd);
            }
            if let Some(config_dir) = dirs::config_dir() {
                paths.push(config_dir.join("keel"));
            }
            paths
        } else {
            self.search_paths.clone()
        }
    }

    /// Common search logic for a single file format.
    ///
    /// Iterates `search_paths × base_names`, tries a profile-specific variant first, then the
    /// base file. Returns `(figment, true)` as soon as a base file is found, or
    /// `(figment, false)` if nothing was located.
    #[cfg(any(feature = "toml-config", feature = "yaml-config"))]
    fn load_format_files<F>(
        &self,
        mut figment: Figment,
        search_paths: &[PathBuf],
        base_names: &[&str],
        merge_fn: F,
    ) -> (Figment, bool)
    where
        F: Fn(Figment, &Path) -> Figment,
    {
        for search_path in search_paths {
            for base_name in base_names {
                let Some((stem, ext)) = base_name.rsplit_once('.') else {
                    continue;
                };

                // e.g. keel.production.toml
                let profile_path =
                    search_path.join(format!("{stem}.{}.{ext}", self.profile.as_str()));
                if profile_path.exists() {
                    debug!(path = %profile_path.display(), "Loading profile-specific config");
                    figment = merge_fn(figment, &profile_path);
                }

                let base_path = search_path.join(base_name);
                if base_path.exists() {
                    info!(path = %base_path.display(), "Loading configuration file");
                    figment = merge_fn(figment, &base_path);
                    return (figment, true);
                }
            }
        }
        (figment, false)
    }

    /// Searches for and loads configuration files from search paths.
    #[allow(unused_mut)]
    fn load_config_files(&self, mut figment: Figment) -> Figment {
        let search_paths = self.resolve_search_paths();
        let mut found = false;

        #[cfg(feature = "toml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &["keel.toml", "config.toml"],
                |fig, path| fig.merge(Toml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        #[cfg(feature = "yaml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &["keel.yaml", "keel.yml", "config.yaml", "config.yml"],
                |fig, path| fig.merge(Yaml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        if !found {
            warn!(paths = ?search_paths, "No configuration file found, using defaults");
        }
        figment
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn profile_from_env() {
        Jail::expect_with(|jail| {
            jail.set_env("KEEL_PROFILE", "prod");
            assert_eq!(Profile::from_env(), Profile::Production);

            jail.set_env("KEEL_PROFILE", "staging");
            assert_eq!(Profile::from_env(), Profile::Custom("staging".into()));
            Ok(())
        });
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = ConfigLoader::new()
            .without_env()
            .file("/nonexistent/keel.toml")
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn sources_layer_in_order() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "keel.toml",
                r#"
                [app]
                name = "from-file"
                stop_timeout_ms = 500

                [modules.web-server]
                active = true
                port = 9000
                "#,
            )?;
            jail.set_env("KEEL_APP__STOP_TIMEOUT_MS", "750");

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .set("app.name", "override")
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.app.name, "override");
            assert_eq!(config.app.stop_timeout_ms, 750);

            let web = config.module("web-server").unwrap();
            assert!(web.active);
            assert_eq!(web.settings["port"], 9000);

            // Untouched defaults survive the merge.
            let logger = config.module("logger").unwrap();
            assert!(logger.active);
            assert_eq!(logger.priority.init, -1000);
            Ok(())
        });
    }

    #[test]
    fn profile_file_sits_below_main_file() {
        Jail::expect_with(|jail| {
            jail.create_file("keel.toml", "[app]\nname = \"base\"")?;
            jail.create_file(
                "keel.production.toml",
                "[app]\nname = \"prod\"\nstop_timeout_ms = 1234",
            )?;

            let config = ConfigLoader::new()
                .without_env()
                .profile("production")
                .search_path(jail.directory())
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.app.name, "base");
            assert_eq!(config.app.stop_timeout_ms, 1234);
            Ok(())
        });
    }

    #[test]
    fn legacy_active_key_disables_builtin_module() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "keel.toml",
                r#"
                [modules.logger]
                moduleIsActive = false
                level = "debug"
                "#,
            )?;

            let config = ConfigLoader::new()
                .without_env()
                .search_path(jail.directory())
                .load()
                .map_err(|e| e.to_string())?;

            let logger = config.module("logger").unwrap();
            assert!(!logger.active);
            assert_eq!(logger.settings["level"], "debug");
            assert_eq!(logger.priority.init, -1000);
            Ok(())
        });
    }

    #[test]
    fn overrides_win_over_legacy_active_key() {
        Jail::expect_with(|jail| {
            jail.create_file("keel.toml", "[modules.logger]\nmoduleIsActive = false")?;

            let config = ConfigLoader::new()
                .without_env()
                .search_path(jail.directory())
                .set("modules.logger.active", true)
                .load()
                .map_err(|e| e.to_string())?;

            assert!(config.module("logger").unwrap().active);
            Ok(())
        });
    }

    #[test]
    fn invalid_values_fail_validation() {
        Jail::expect_with(|jail| {
            let err = ConfigLoader::new()
                .without_env()
                .search_path(jail.directory())
                .set("app.stop_timeout_ms", 0)
                .load()
                .unwrap_err();
            assert!(matches!(err, ConfigError::ValidationError { .. }));
            Ok(())
        });
    }
}
