//! Pluggable authentication.
//!
//! An [`AuthProvider`] produces a raw, provider-defined result for a request.
//! A controller may name a *mode* of that provider, an [`AuthMode`] that turns
//! the raw result into the final decision. [`TryMode`] passes the raw result
//! through and [`RequiredMode`] rejects an empty one with `401`.
//!
//! Providers are declared on the [`AuthRegistry`] before startup and become
//! resolvable once the `auth` module has initialised them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use keel_core::{AppError, BoxError, Request};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::context::AppContext;
use crate::error::LoadError;

/// A controller's auth declaration.
///
/// Serialised as `{"type": "...", "mode": "...", ...}`; any extra keys (scopes,
/// roles) are kept in `extra` for the provider to interpret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthRequirement {
    #[serde(rename = "type")]
    pub provider: String,
    #[serde(default, alias = "method", skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuthRequirement {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            mode: None,
            extra: Map::new(),
        }
    }

    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// Adds a provider-specific option.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

// =============================================================================
// Provider & mode traits
// =============================================================================

/// A named authentication strategy.
#[async_trait]
pub trait AuthProvider: Send + Sync + 'static {
    /// One-time setup, run by the `auth` module during init.
    async fn init(&self, _app: &AppContext) -> Result<(), BoxError> {
        Ok(())
    }

    /// Produces the raw result, `None` when the request carries no identity.
    async fn auth(
        &self,
        app: &AppContext,
        req: &Request,
        requirement: &AuthRequirement,
    ) -> Result<Option<Value>, BoxError>;

    /// Looks up a named mode.
    fn mode(&self, _name: &str) -> Option<Arc<dyn AuthMode>> {
        None
    }
}

/// Refines a raw auth result into the final one.
#[async_trait]
pub trait AuthMode: Send + Sync + 'static {
    async fn refine(
        &self,
        app: &AppContext,
        req: &Request,
        requirement: &AuthRequirement,
        raw: Option<Value>,
    ) -> Result<Option<Value>, BoxError>;
}

/// Passes the raw result through, empty or not.
#[derive(Debug, Clone, Copy, Default)]
pub struct TryMode;

#[async_trait]
impl AuthMode for TryMode {
    async fn refine(
        &self,
        _app: &AppContext,
        _req: &Request,
        _requirement: &AuthRequirement,
        raw: Option<Value>,
    ) -> Result<Option<Value>, BoxError> {
        Ok(raw)
    }
}

/// Rejects an empty raw result with `401 Unauthorized`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequiredMode;

#[async_trait]
impl AuthMode for RequiredMode {
    async fn refine(
        &self,
        _app: &AppContext,
        _req: &Request,
        _requirement: &AuthRequirement,
        raw: Option<Value>,
    ) -> Result<Option<Value>, BoxError> {
        match raw {
            Some(value) if !value.is_null() => Ok(Some(value)),
            _ => Err(AppError::status(401).into()),
        }
    }
}

/// The stock `try` and `required` modes, for providers that offer them.
pub fn standard_mode(name: &str) -> Option<Arc<dyn AuthMode>> {
    match name {
        "try" => Some(Arc::new(TryMode)),
        "required" => Some(Arc::new(RequiredMode)),
        _ => None,
    }
}

// =============================================================================
// AuthRegistry
// =============================================================================

type ProviderArc = Arc<dyn AuthProvider>;

/// Declared and installed auth providers.
#[derive(Default)]
pub struct AuthRegistry {
    declared: RwLock<Vec<(String, ProviderArc)>>,
    installed: RwLock<HashMap<String, ProviderArc>>,
}

impl AuthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a provider under `name`.
    pub fn declare(&self, name: impl Into<String>, provider: ProviderArc) -> Result<(), LoadError> {
        let name = name.into();
        let mut declared = self.declared.write();
        if declared.iter().any(|(n, _)| *n == name) {
            return Err(LoadError::DuplicateAuthProvider(name));
        }
        declared.push((name, provider));
        Ok(())
    }

    /// Initialises every declared provider in declaration order and makes it
    /// resolvable.
    pub async fn install_all(&self, app: &AppContext) -> Result<(), BoxError> {
        let declared = self.declared.read().clone();
        for (name, provider) in declared {
            provider.init(app).await?;
            debug!(provider = %name, "auth provider initialised");
            self.installed.write().insert(name, provider);
        }
        info!(count = self.installed.read().len(), "auth providers installed");
        Ok(())
    }

    /// Returns an installed provider.
    pub fn get(&self, name: &str) -> Option<ProviderArc> {
        self.installed.read().get(name).cloned()
    }

    /// Names of the installed providers, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.installed.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Checks that `requirement` names an installed provider exposing the
    /// requested mode.
    pub fn check_requirement(
        &self,
        requirement: &AuthRequirement,
        route: &str,
    ) -> Result<(), LoadError> {
        let provider = self
            .get(&requirement.provider)
            .ok_or_else(|| LoadError::NoAuthType {
                provider: requirement.provider.clone(),
                route: route.to_string(),
            })?;

        if let Some(mode) = &requirement.mode
            && provider.mode(mode).is_none()
        {
            return Err(LoadError::NoAuthMethod {
                provider: requirement.provider.clone(),
                mode: mode.clone(),
                route: route.to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for AuthRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let declared: Vec<_> = self.declared.read().iter().map(|(n, _)| n.clone()).collect();
        f.debug_struct("AuthRegistry")
            .field("declared", &declared)
            .field("installed", &self.names())
            .finish()
    }
}

/// Resolves a controller's auth requirement for one request.
///
/// No requirement resolves to `None` without calling anything.
pub async fn resolve(
    app: &AppContext,
    req: &Request,
    requirement: Option<&AuthRequirement>,
) -> Result<Option<Value>, BoxError> {
    let Some(requirement) = requirement else {
        return Ok(None);
    };

    let provider = app.auth().get(&requirement.provider).ok_or_else(|| {
        AppError::new("NO_AUTH", format!("auth provider '{}' is not installed", requirement.provider))
    })?;

    let raw = provider.auth(app, req, requirement).await?;

    match &requirement.mode {
        None => Ok(raw),
        Some(name) => {
            let mode = provider.mode(name).ok_or_else(|| {
                AppError::new(
                    "NO_AUTH_METHOD",
                    format!("auth provider '{}' has no mode '{name}'", requirement.provider),
                )
            })?;
            mode.refine(app, req, requirement, raw).await
        }
    }
}
