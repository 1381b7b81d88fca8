use std::fmt;
use std::sync::Arc;

use keel_core::Method;

use super::pattern::PathPattern;
use crate::controller::Controller;
use crate::validation::SectionSchemas;

/// A route declaration, before load-time checks.
#[derive(Debug, Clone)]
pub struct RouteDef {
    pub method: Method,
    pub path: String,
    pub controller: Arc<Controller>,
}

impl RouteDef {
    pub fn new(method: Method, path: impl Into<String>, controller: Controller) -> Self {
        Self {
            method,
            path: path.into(),
            controller: Arc::new(controller),
        }
    }

    /// Declares several methods on one path, like a controller that exports
    /// one entry per method.
    pub fn for_path(
        path: &str,
        methods: impl IntoIterator<Item = (Method, Controller)>,
    ) -> Vec<RouteDef> {
        methods
            .into_iter()
            .map(|(method, controller)| RouteDef::new(method, path, controller))
            .collect()
    }

    /// `"METHOD /path"`, used in logs and load errors.
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

impl<P: Into<String>> From<(Method, P, Controller)> for RouteDef {
    fn from((method, path, controller): (Method, P, Controller)) -> Self {
        RouteDef::new(method, path, controller)
    }
}

/// A checked, immutable route.
pub struct Route {
    pub method: Method,
    pub pattern: PathPattern,
    pub controller: Arc<Controller>,
    /// Schemas resolved at load time.
    pub schemas: Option<Arc<SectionSchemas>>,
}

impl Route {
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.pattern)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.pattern.as_str())
            .field("controller", &self.controller.description())
            .finish()
    }
}
