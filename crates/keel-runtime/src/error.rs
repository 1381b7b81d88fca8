//! Runtime error types.
//!
//! Everything here is fatal: it aborts startup or shutdown and is surfaced
//! to the caller of [`KeelRuntime`](crate::KeelRuntime).

use std::time::Duration;

use keel_core::{AppError, BoxError, Phase};
use keel_framework::LoadError;
use serde_json::json;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while building or driving the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// An active module has no source in either search table.
    #[error("module '{name}' does not exist")]
    ModuleNotFound {
        name: String,
        /// Why the application table could not provide it.
        app_lookup: String,
        /// Why the framework table could not provide it.
        builtin_lookup: String,
    },

    /// A module source does not provide the capability set it declares.
    #[error("module '{name}' is invalid: {reason}")]
    ModuleInvalid { name: String, reason: String },

    /// A module factory failed.
    #[error("module '{name}' could not be constructed: {source}")]
    ModuleConstruct {
        name: String,
        #[source]
        source: BoxError,
    },

    /// A module rejected a lifecycle phase.
    #[error("module '{module}' failed to {phase}: {source}")]
    Lifecycle {
        phase: Phase,
        module: String,
        #[source]
        source: BoxError,
    },

    /// The stop sweep did not finish within the configured budget.
    #[error("app can not stop correctly in time ({}ms)", .timeout.as_millis())]
    StopTimeout { timeout: Duration },

    /// The stop sweep task panicked or was cancelled.
    #[error("stop sweep aborted: {0}")]
    StopAborted(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RuntimeError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ModuleNotFound { .. } => "MODULE_DOES_NOT_EXIST",
            Self::ModuleInvalid { .. } => "MODULE_IS_INVALID",
            Self::ModuleConstruct { .. } => "MODULE_CONSTRUCT_ERROR",
            Self::Lifecycle { .. } => "LIFECYCLE_ERROR",
            Self::StopTimeout { .. } => "TIMEOUT_ERROR",
            Self::StopAborted(_) => "STOP_ABORTED",
            Self::Load(err) => err.code(),
            Self::Config(_) => "CONFIG_ERROR",
        }
    }
}

impl From<RuntimeError> for AppError {
    fn from(err: RuntimeError) -> Self {
        let details = match &err {
            RuntimeError::ModuleNotFound {
                app_lookup,
                builtin_lookup,
                ..
            } => Some(json!({ "appErr": app_lookup, "builtinErr": builtin_lookup })),
            RuntimeError::Lifecycle { phase, module, .. } => {
                Some(json!({ "phase": phase.as_str(), "module": module }))
            }
            RuntimeError::StopTimeout { timeout } => {
                Some(json!({ "timeoutMs": timeout.as_millis() as u64 }))
            }
            _ => None,
        };

        if let RuntimeError::Load(load) = err {
            return load.into();
        }

        let mut app_err = AppError::new(err.code(), err.to_string());
        app_err.details = details;
        app_err
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_converts_to_uniform_shape() {
        let err: AppError = RuntimeError::StopTimeout {
            timeout: Duration::from_millis(250),
        }
        .into();

        assert!(err.is_code("TIMEOUT_ERROR"));
        assert_eq!(err.details, Some(json!({ "timeoutMs": 250 })));
    }

    #[test]
    fn load_errors_keep_their_code() {
        let err = RuntimeError::from(LoadError::HooksFrozen);
        assert_eq!(err.code(), "HOOKS_FROZEN");
        assert!(AppError::from(err).is_code("HOOKS_FROZEN"));
    }
}
