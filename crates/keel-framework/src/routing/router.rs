use std::collections::HashSet;

use keel_core::{AppError, Request};
use tracing::{debug, trace};

use super::pattern::PathPattern;
use super::route::{Route, RouteDef};
use crate::auth::AuthRegistry;
use crate::error::LoadError;
use crate::validation::Validator;

/// The immutable route table.
///
/// Routes are ordered once at build time: by path priority (literal segments
/// before parameters, literals lexically), then specific methods before
/// `ALL`, then declaration order.
#[derive(Debug)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Checks and orders route declarations.
    ///
    /// Fails on malformed paths, duplicate method/shape pairs, auth
    /// requirements naming an unknown provider or mode, and builder-form
    /// validation without a validator.
    pub fn build(
        defs: Vec<RouteDef>,
        auth: &AuthRegistry,
        validator: Option<&Validator>,
    ) -> Result<Self, LoadError> {
        let mut seen = HashSet::new();
        let mut routes = Vec::with_capacity(defs.len());

        for def in defs {
            let label = def.label();
            let pattern = PathPattern::parse(&def.path)?;

            if !seen.insert((def.method, pattern.shape())) {
                return Err(LoadError::DuplicateRoute {
                    method: def.method,
                    path: def.path,
                });
            }

            if let Some(requirement) = def.controller.auth_requirement() {
                auth.check_requirement(requirement, &label)?;
            }
            let schemas = def.controller.resolve_schemas(validator, &label)?;

            debug!(route = %label, description = def.controller.description(), "route loaded");
            routes.push(Route {
                method: def.method,
                pattern,
                controller: def.controller,
                schemas,
            });
        }

        routes.sort_by(|a, b| {
            a.pattern
                .priority_cmp(&b.pattern)
                .then_with(|| a.method.is_wildcard().cmp(&b.method.is_wildcard()))
        });

        Ok(Self { routes })
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Selects the route for `req` and binds its path parameters.
    ///
    /// Fails with `405` when some route matched the path but none the method,
    /// and with `404` when no route matched the path.
    pub fn select(&self, req: &mut Request) -> Result<&Route, AppError> {
        let (route, bindings) = {
            let parts: Vec<&str> = req.path.split('/').collect();
            let mut path_exists = false;
            let mut selected = None;

            for route in &self.routes {
                if !route.pattern.matches(&parts) {
                    continue;
                }
                path_exists = true;
                if route.method.accepts(req.method) {
                    selected = Some(route);
                    break;
                }
            }

            let Some(route) = selected else {
                let status = if path_exists { 405 } else { 404 };
                trace!(method = %req.method, path = %req.path, status, "no route selected");
                return Err(AppError::status(status));
            };

            let bindings: Vec<(String, String)> = route
                .pattern
                .bind(&parts)
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect();
            (route, bindings)
        };

        for (name, value) in bindings {
            req.set_param(name, value);
        }
        Ok(route)
    }
}

/// Builds with no auth providers and a default validator.
impl TryFrom<Vec<RouteDef>> for Router {
    type Error = LoadError;

    fn try_from(defs: Vec<RouteDef>) -> Result<Self, Self::Error> {
        Router::build(defs, &AuthRegistry::new(), Some(&Validator::default()))
    }
}
