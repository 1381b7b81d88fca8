//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{AppConfig, KeelConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &KeelConfig) -> ConfigResult<()> {
    validate_app_config(&config.app)?;
    for name in config.modules.keys() {
        validate_module_name(name)?;
    }
    Ok(())
}

fn validate_app_config(app: &AppConfig) -> ConfigResult<()> {
    if app.stop_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "Stop timeout must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_module_name(name: &str) -> ConfigResult<()> {
    if name.is_empty() {
        return Err(ConfigError::validation("Module name must not be empty"));
    }
    if name
        .chars()
        .any(|c| c.is_whitespace() || c == '/' || c == '\\')
    {
        return Err(ConfigError::validation(format!(
            "Invalid module name '{name}': whitespace and path separators are not allowed"
        )));
    }
    Ok(())
}
