//! Controllers: the declarative bundle a route dispatches to.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use keel_core::{BoxError, Reply, Request};
use serde_json::Value;

use crate::auth::AuthRequirement;
use crate::context::AppContext;
use crate::error::LoadError;
use crate::validation::{SectionSchemas, Validator};

/// Produces the response value of a controller.
///
/// `reply` lets the handler customise the transport response (status,
/// headers). Returning an [`AppError`](keel_core::AppError) inside the box
/// yields that error to the caller; any other error becomes an internal one.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(
        &self,
        app: &AppContext,
        req: &Request,
        reply: &mut Reply,
    ) -> Result<Value, BoxError>;
}

/// Adapts a synchronous closure into a [`Handler`].
pub struct HandlerFn<F>(F);

/// Wraps a synchronous closure as a [`Handler`].
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: Fn(&AppContext, &Request, &mut Reply) -> Result<Value, BoxError> + Send + Sync + 'static,
{
    HandlerFn(f)
}

#[async_trait]
impl<F> Handler for HandlerFn<F>
where
    F: Fn(&AppContext, &Request, &mut Reply) -> Result<Value, BoxError> + Send + Sync + 'static,
{
    async fn call(
        &self,
        app: &AppContext,
        req: &Request,
        reply: &mut Reply,
    ) -> Result<Value, BoxError> {
        (self.0)(app, req, reply)
    }
}

type SchemaBuilder = Arc<dyn Fn(&Validator) -> SectionSchemas + Send + Sync>;

#[derive(Clone)]
enum Validate {
    Ready(Arc<SectionSchemas>),
    Build(SchemaBuilder),
}

/// A handler together with its auth and validation declarations.
///
/// # Example
///
/// ```rust
/// use keel_framework::{AuthRequirement, Controller, Schema, SectionSchemas, handler_fn};
/// use serde_json::json;
///
/// let add = Controller::new("Save item", handler_fn(|_, req, _| Ok(json!({ "title": req.body["title"] }))))
///     .auth(AuthRequirement::new("basic-auth").mode("required"))
///     .validate_with(|_| {
///         SectionSchemas::new().body(
///             Schema::object()
///                 .key("title", Schema::string().required())
///                 .key("price", Schema::integer().positive().required()),
///         )
///     });
///
/// assert_eq!(add.description(), "Save item");
/// ```
#[derive(Clone)]
pub struct Controller {
    description: String,
    auth: Option<AuthRequirement>,
    validate: Option<Validate>,
    handler: Arc<dyn Handler>,
}

impl Controller {
    pub fn new(description: impl Into<String>, handler: impl Handler) -> Self {
        Self {
            description: description.into(),
            auth: None,
            validate: None,
            handler: Arc::new(handler),
        }
    }

    /// Requires authentication through the given provider and mode.
    pub fn auth(mut self, requirement: AuthRequirement) -> Self {
        self.auth = Some(requirement);
        self
    }

    /// Validates request sections against ready-made schemas.
    pub fn validate(mut self, schemas: SectionSchemas) -> Self {
        self.validate = Some(Validate::Ready(Arc::new(schemas)));
        self
    }

    /// Builds the schemas from the installed validator at route load time.
    pub fn validate_with<F>(mut self, build: F) -> Self
    where
        F: Fn(&Validator) -> SectionSchemas + Send + Sync + 'static,
    {
        self.validate = Some(Validate::Build(Arc::new(build)));
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn auth_requirement(&self) -> Option<&AuthRequirement> {
        self.auth.as_ref()
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    /// Returns `true` if the controller declares validation.
    pub fn validates(&self) -> bool {
        self.validate.is_some()
    }

    /// Resolves the declared schemas, running the builder form once.
    pub(crate) fn resolve_schemas(
        &self,
        validator: Option<&Validator>,
        route: &str,
    ) -> Result<Option<Arc<SectionSchemas>>, LoadError> {
        match &self.validate {
            None => Ok(None),
            Some(Validate::Ready(schemas)) => Ok(Some(Arc::clone(schemas))),
            Some(Validate::Build(build)) => {
                let validator = validator.ok_or_else(|| LoadError::NoValidator {
                    route: route.to_string(),
                })?;
                Ok(Some(Arc::new(build(validator))))
            }
        }
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("description", &self.description)
            .field("auth", &self.auth)
            .field("validates", &self.validates())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::Schema;
    use serde_json::json;

    fn controller() -> Controller {
        Controller::new("echo", handler_fn(|_, _, _| Ok(json!(null))))
    }

    #[test]
    fn builder_schemas_need_a_validator() {
        let c = controller().validate_with(|_| SectionSchemas::new().query(Schema::object()));

        let err = c.resolve_schemas(None, "GET /echo").unwrap_err();
        assert_eq!(err.code(), "NO_VALIDATOR");

        let resolved = c.resolve_schemas(Some(&Validator::default()), "GET /echo").unwrap();
        assert!(resolved.is_some());
    }

    #[test]
    fn ready_schemas_work_without_validator() {
        let c = controller().validate(SectionSchemas::new().body(Schema::object()));
        assert!(c.resolve_schemas(None, "POST /echo").unwrap().is_some());
        assert!(controller().resolve_schemas(None, "GET /").unwrap().is_none());
    }
}
