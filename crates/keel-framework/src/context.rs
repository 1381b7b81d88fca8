//! The application context.
//!
//! One [`AppContext`] exists per runtime. It is created before any module,
//! handed to every module factory as `Arc<AppContext>` and passed by
//! reference into hooks, auth providers and handlers. It holds the shared,
//! read-mostly capabilities:
//!
//! - the hook chains ([`HookRegistry`])
//! - the auth providers ([`AuthRegistry`])
//! - declared routes and, after the `router` module's init, the [`Router`]
//! - the [`Validator`] installed by the `validator` module
//! - typed application state (stores, clients) registered by the application

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};

use crate::auth::AuthRegistry;
use crate::error::LoadError;
use crate::hooks::HookRegistry;
use crate::routing::{RouteDef, Router};
use crate::validation::Validator;

type StateArc = Arc<dyn Any + Send + Sync>;

/// Capabilities shared by all modules and requests of one application.
pub struct AppContext {
    name: String,
    hooks: HookRegistry,
    auth: AuthRegistry,
    routes: Mutex<Vec<RouteDef>>,
    router: OnceLock<Arc<Router>>,
    validator: OnceLock<Validator>,
    state: RwLock<HashMap<TypeId, StateArc>>,
}

impl AppContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hooks: HookRegistry::new(),
            auth: AuthRegistry::new(),
            routes: Mutex::new(Vec::new()),
            router: OnceLock::new(),
            validator: OnceLock::new(),
            state: RwLock::new(HashMap::new()),
        }
    }

    /// Application name, used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn auth(&self) -> &AuthRegistry {
        &self.auth
    }

    // ─── Routes ──────────────────────────────────────────────────────────────

    /// Queues route declarations for the router.
    pub fn declare_routes(
        &self,
        defs: impl IntoIterator<Item = RouteDef>,
    ) -> Result<(), LoadError> {
        if self.router.get().is_some() {
            return Err(LoadError::RouterInstalled);
        }
        self.routes.lock().extend(defs);
        Ok(())
    }

    /// The queued declarations. They stay queued so a failed router build
    /// can be retried.
    pub fn declared_routes(&self) -> Vec<RouteDef> {
        self.routes.lock().clone()
    }

    pub fn install_router(&self, router: Router) -> Result<(), LoadError> {
        self.router
            .set(Arc::new(router))
            .map_err(|_| LoadError::RouterInstalled)
    }

    /// The installed router, if the `router` module has initialised.
    pub fn router(&self) -> Option<Arc<Router>> {
        self.router.get().cloned()
    }

    // ─── Validator ───────────────────────────────────────────────────────────

    pub fn install_validator(&self, validator: Validator) -> Result<(), LoadError> {
        self.validator
            .set(validator)
            .map_err(|_| LoadError::ValidatorInstalled)
    }

    /// The installed validator, if the `validator` module has initialised.
    pub fn validator(&self) -> Option<&Validator> {
        self.validator.get()
    }

    // ─── Application state ───────────────────────────────────────────────────

    /// Stores shared state of type `T`, replacing any previous value.
    pub fn insert_state<T: Send + Sync + 'static>(&self, value: T) {
        self.insert_state_arc(Arc::new(value));
    }

    /// Stores an already shared value.
    pub fn insert_state_arc<T: Send + Sync + 'static>(&self, value: Arc<T>) {
        self.state.write().insert(TypeId::of::<T>(), value);
    }

    /// Returns the shared state of type `T`.
    pub fn state<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.state
            .read()
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|arc| arc.downcast::<T>().ok())
    }
}

impl fmt::Debug for AppContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppContext")
            .field("name", &self.name)
            .field("hooks", &self.hooks)
            .field("auth", &self.auth)
            .field("router", &self.router.get().map(|r| r.len()))
            .field("validator", &self.validator.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{Controller, handler_fn};
    use keel_core::Method;
    use serde_json::json;

    #[test]
    fn state_is_keyed_by_type() {
        let app = AppContext::new("test");
        app.insert_state(Mutex::new(vec![1, 2]));
        app.insert_state(String::from("shared"));

        let list = app.state::<Mutex<Vec<i32>>>().unwrap();
        list.lock().push(3);
        assert_eq!(*app.state::<Mutex<Vec<i32>>>().unwrap().lock(), vec![1, 2, 3]);
        assert_eq!(app.state::<String>().as_deref().map(String::as_str), Some("shared"));
        assert!(app.state::<u8>().is_none());
    }

    #[test]
    fn routes_close_once_router_is_installed() {
        let app = AppContext::new("test");
        let ping = Controller::new("ping", handler_fn(|_, _, _| Ok(json!("pong"))));
        app.declare_routes([RouteDef::from((Method::Get, "/ping", ping.clone()))])
            .unwrap();

        let router = Router::try_from(app.declared_routes()).unwrap();
        app.install_router(router).unwrap();

        assert_eq!(app.router().unwrap().len(), 1);
        assert_eq!(
            app.declare_routes([RouteDef::from((Method::Get, "/pong", ping))]),
            Err(LoadError::RouterInstalled)
        );
    }
}
