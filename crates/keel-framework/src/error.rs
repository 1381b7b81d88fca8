//! Load-time configuration errors.
//!
//! Everything here is detected while modules initialise, before the first
//! request is served, and aborts startup.

use keel_core::{AppError, Method};
use serde_json::json;
use thiserror::Error;

/// A malformed or inconsistent declaration found during module init.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// A controller names an auth provider nobody registered.
    #[error("auth provider '{provider}' used by {route} is not registered")]
    NoAuthType { provider: String, route: String },

    /// A controller names a mode its auth provider does not expose.
    #[error("auth provider '{provider}' has no mode '{mode}' (used by {route})")]
    NoAuthMethod {
        provider: String,
        mode: String,
        route: String,
    },

    #[error("invalid route path '{path}': {reason}")]
    InvalidRoute { path: String, reason: &'static str },

    #[error("route {method} {path} is declared more than once")]
    DuplicateRoute { method: Method, path: String },

    /// A controller builds its schema from the validator, which is inactive.
    #[error("{route} declares validation through the validator, but no validator is installed")]
    NoValidator { route: String },

    #[error("auth provider '{0}' is already registered")]
    DuplicateAuthProvider(String),

    #[error("hooks can only be registered before the init phase completes")]
    HooksFrozen,

    #[error("a router is already installed")]
    RouterInstalled,

    #[error("a validator is already installed")]
    ValidatorInstalled,
}

impl LoadError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            LoadError::NoAuthType { .. } => "NO_AUTH",
            LoadError::NoAuthMethod { .. } => "NO_AUTH_METHOD",
            LoadError::InvalidRoute { .. } => "INVALID_ROUTE",
            LoadError::DuplicateRoute { .. } => "DUPLICATE_ROUTE",
            LoadError::NoValidator { .. } => "NO_VALIDATOR",
            LoadError::DuplicateAuthProvider(_) => "DUPLICATE_AUTH_PROVIDER",
            LoadError::HooksFrozen => "HOOKS_FROZEN",
            LoadError::RouterInstalled => "ROUTER_INSTALLED",
            LoadError::ValidatorInstalled => "VALIDATOR_INSTALLED",
        }
    }
}

impl From<LoadError> for AppError {
    fn from(err: LoadError) -> Self {
        let details = match &err {
            LoadError::NoAuthType { provider, route } => {
                Some(json!({ "type": provider, "route": route }))
            }
            LoadError::NoAuthMethod {
                provider,
                mode,
                route,
            } => Some(json!({ "type": provider, "mode": mode, "route": route })),
            LoadError::InvalidRoute { path, .. } | LoadError::DuplicateRoute { path, .. } => {
                Some(json!({ "path": path }))
            }
            _ => None,
        };
        let app = AppError::new(err.code(), err.to_string());
        match details {
            Some(details) => app.with_details(details),
            None => app,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_to_uniform_shape() {
        let err = LoadError::NoAuthMethod {
            provider: "basic-auth".into(),
            mode: "admin".into(),
            route: "GET /items".into(),
        };
        let app: AppError = err.into();
        assert!(app.is_code("NO_AUTH_METHOD"));
        assert_eq!(app.details.unwrap()["mode"], "admin");
    }
}
