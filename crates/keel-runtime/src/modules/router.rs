//! The `router` module: checks the declared routes and installs the
//! immutable [`Router`].
//!
//! Runs after `validator` and `auth` so that auth requirements and
//! builder-form schemas can be checked against what they installed.

use std::sync::Arc;

use keel_core::{BoxError, BoxedModule, Module, Priority, async_trait};
use keel_framework::{
    AppContext, BUILTIN_MODULES, ModuleConfig, ModuleDescriptor, ModuleKind, Router,
};
use linkme::distributed_slice;
use tracing::info;

#[distributed_slice(BUILTIN_MODULES)]
static ROUTER: ModuleDescriptor = ModuleDescriptor {
    name: "router",
    kind: ModuleKind::Module,
    factory: RouterModule::create,
    default_config: RouterModule::default_config,
};

pub struct RouterModule {
    app: Arc<AppContext>,
}

impl RouterModule {
    fn create(app: Arc<AppContext>, _config: &ModuleConfig) -> Result<BoxedModule, BoxError> {
        Ok(Arc::new(Self { app }))
    }

    fn default_config() -> ModuleConfig {
        ModuleConfig::active(Priority::new(-900, -900, 900))
    }
}

#[async_trait]
impl Module for RouterModule {
    async fn init(&self) -> Result<(), BoxError> {
        let router = Router::build(
            self.app.declared_routes(),
            self.app.auth(),
            self.app.validator(),
        )?;
        info!(routes = router.len(), "router installed");
        self.app.install_router(router)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::{Method, Request};
    use keel_framework::{
        AuthMode, AuthProvider, AuthRequirement, Controller, RouteDef, handler_fn, standard_mode,
    };
    use serde_json::json;

    #[tokio::test]
    async fn installs_declared_routes() {
        let app = Arc::new(AppContext::new("test"));
        app.declare_routes([RouteDef::from((
            Method::Get,
            "/ping",
            Controller::new("ping", handler_fn(|_, _, _| Ok(json!("pong")))),
        ))])
        .unwrap();

        let module = RouterModule::create(Arc::clone(&app), &RouterModule::default_config()).unwrap();
        module.init().await.unwrap();

        let router = app.router().unwrap();
        let mut req = Request::new(Method::Get, "/ping");
        assert!(router.select(&mut req).is_ok());
    }

    #[tokio::test]
    async fn unknown_auth_provider_aborts_init() {
        let app = Arc::new(AppContext::new("test"));
        app.declare_routes([RouteDef::from((
            Method::Get,
            "/me",
            Controller::new("me", handler_fn(|_, _, _| Ok(json!(null))))
                .auth(AuthRequirement::new("basic-auth").mode("required")),
        ))])
        .unwrap();

        let module = RouterModule::create(Arc::clone(&app), &RouterModule::default_config()).unwrap();
        let err = module.init().await.unwrap_err();
        assert!(err.to_string().contains("basic-auth"));
        assert!(app.router().is_none());
    }

    struct Anyone;

    #[async_trait]
    impl AuthProvider for Anyone {
        async fn auth(
            &self,
            _app: &AppContext,
            _req: &Request,
            _requirement: &AuthRequirement,
        ) -> Result<Option<serde_json::Value>, BoxError> {
            Ok(Some(json!({ "id": "anyone" })))
        }

        fn mode(&self, name: &str) -> Option<Arc<dyn AuthMode>> {
            standard_mode(name)
        }
    }

    #[tokio::test]
    async fn failed_init_keeps_routes_for_retry() {
        let app = Arc::new(AppContext::new("test"));
        app.declare_routes([RouteDef::from((
            Method::Get,
            "/me",
            Controller::new("me", handler_fn(|_, _, _| Ok(json!(null))))
                .auth(AuthRequirement::new("basic-auth").mode("required")),
        ))])
        .unwrap();
        let module = RouterModule::create(Arc::clone(&app), &RouterModule::default_config()).unwrap();
        assert!(module.init().await.is_err());

        app.auth().declare("basic-auth", Arc::new(Anyone)).unwrap();
        app.auth().install_all(&app).await.unwrap();
        module.init().await.unwrap();
        assert_eq!(app.router().unwrap().len(), 1);
    }
}
