//! Main runtime orchestration.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use keel_runtime::KeelRuntime;
//!
//! let runtime = KeelRuntime::builder()
//!     .auth_provider("basic-auth", BasicAuth::default())
//!     .routes(routes())
//!     .module("store", Priority::new(-10, 0, 0), |app, _| Ok(Arc::new(Store::new(app))))
//!     .build()?;
//!
//! runtime.run().await?;
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use keel_core::{BoxError, BoxedModule, BoxedServer, Priority};
use keel_framework::{
    AppContext, AuthProvider, LoadError, ModuleConfig, ModuleKind, RouteDef,
};
use serde::Serialize;
use tokio::signal;
use tracing::{error, info, warn};

use crate::config::{ConfigLoader, KeelConfig, validate_config};
use crate::error::RuntimeResult;
use crate::lifecycle::{Lifecycle, LifecycleDates, LifecycleStates, ModuleOrder, PhaseRun};
use crate::registry::ModuleRegistry;

/// One application: its context, its modules and their lifecycle.
///
/// ```rust,ignore
/// let runtime = KeelRuntime::builder()
///     .config_file("config/keel.toml")
///     .profile("production")
///     .build()?;
///
/// runtime.init().await?;
/// runtime.start().await?;
/// // ...
/// runtime.stop().await?;
/// ```
pub struct KeelRuntime {
    config: KeelConfig,
    app: Arc<AppContext>,
    lifecycle: Lifecycle,
}

impl std::fmt::Debug for KeelRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeelRuntime")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl KeelRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// The resolved configuration.
    pub fn config(&self) -> &KeelConfig {
        &self.config
    }

    pub fn app(&self) -> &Arc<AppContext> {
        &self.app
    }

    /// A loaded module by name.
    pub fn module(&self, name: &str) -> Option<&BoxedModule> {
        self.lifecycle.module(name).map(|m| &m.instance)
    }

    /// A loaded server module by name.
    pub fn server(&self, name: &str) -> Option<&BoxedServer> {
        self.lifecycle.module(name).and_then(|m| m.server.as_ref())
    }

    /// Per-phase call orders.
    pub fn order(&self) -> &ModuleOrder {
        self.lifecycle.order()
    }

    pub fn dates(&self) -> LifecycleDates {
        self.lifecycle.dates()
    }

    pub fn states(&self) -> LifecycleStates {
        self.lifecycle.states()
    }

    /// Initialises every module, then freezes hook registration.
    pub async fn init(&self) -> RuntimeResult<PhaseRun> {
        info!(
            app = %self.app.name(),
            pid = std::process::id(),
            "initializing"
        );
        let run = self.lifecycle.init().await?;
        if run == PhaseRun::Completed {
            self.app.hooks().freeze();
        }
        Ok(run)
    }

    pub async fn start(&self) -> RuntimeResult<PhaseRun> {
        info!(app = %self.app.name(), "starting");
        self.lifecycle.start().await
    }

    /// Stops every module within the configured stop timeout.
    pub async fn stop(&self) -> RuntimeResult<PhaseRun> {
        info!(app = %self.app.name(), "stopping");
        self.lifecycle.stop().await
    }

    /// Runs the runtime until a shutdown signal is received.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.run_until(wait_for_shutdown()).await
    }

    /// Runs the runtime with a custom shutdown future.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.init().await?;
        self.start().await?;

        info!(app = %self.app.name(), "running");
        shutdown.await;

        self.stop().await?;
        Ok(())
    }
}

/// Waits for shutdown signals (Ctrl+C or SIGTERM).
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler, listening for Ctrl+C only");
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

type Setup = Box<dyn FnOnce(&AppContext) -> Result<(), LoadError> + Send>;

/// Builder for a [`KeelRuntime`].
///
/// Auth providers, routes and state are applied to the [`AppContext`] in
/// call order, before any module is constructed.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<KeelConfig>,
    registry: ModuleRegistry,
    setup: Vec<Setup>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            config: None,
            registry: ModuleRegistry::new(),
            setup: Vec::new(),
        }
    }

    // ─── Configuration ───────────────────────────────────────────────────────

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges a (partial) configuration value over files and environment.
    pub fn merge<T: Serialize>(mut self, value: T) -> Self {
        self.config_loader = self.config_loader.merge(value);
        self
    }

    /// Overrides one dotted configuration key.
    pub fn set<T: Serialize>(mut self, key: &str, value: T) -> Self {
        self.config_loader = self.config_loader.set(key, value);
        self
    }

    pub fn name(self, name: &str) -> Self {
        self.set("app.name", name)
    }

    pub fn stop_timeout(self, timeout: Duration) -> Self {
        self.set("app.stop_timeout_ms", timeout.as_millis() as u64)
    }

    /// Uses an already resolved configuration instead of loading one.
    ///
    /// Modules missing from it get their default config.
    pub fn config(mut self, config: KeelConfig) -> Self {
        self.config = Some(config);
        self
    }

    // ─── Modules ─────────────────────────────────────────────────────────────

    /// Registers an application module, active by default.
    pub fn module<F>(self, name: &str, priority: Priority, factory: F) -> Self
    where
        F: Fn(Arc<AppContext>, &ModuleConfig) -> Result<BoxedModule, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.register(name, ModuleKind::Module, ModuleConfig::active(priority), factory)
    }

    /// Registers an application server module, active by default.
    pub fn server_module<F>(self, name: &str, priority: Priority, factory: F) -> Self
    where
        F: Fn(Arc<AppContext>, &ModuleConfig) -> Result<BoxedModule, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.register(name, ModuleKind::Server, ModuleConfig::active(priority), factory)
    }

    /// Registers a module source with an explicit default config.
    pub fn register<F>(
        mut self,
        name: &str,
        kind: ModuleKind,
        default_config: ModuleConfig,
        factory: F,
    ) -> Self
    where
        F: Fn(Arc<AppContext>, &ModuleConfig) -> Result<BoxedModule, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.registry.register(name, kind, default_config, factory);
        self
    }

    // ─── Application context ─────────────────────────────────────────────────

    /// Declares an auth provider; the `auth` module initialises it.
    pub fn auth_provider(self, name: &str, provider: impl AuthProvider) -> Self {
        let name = name.to_string();
        let provider: Arc<dyn AuthProvider> = Arc::new(provider);
        self.configure(move |app| app.auth().declare(name, provider))
    }

    pub fn route(self, route: impl Into<RouteDef>) -> Self {
        let route = route.into();
        self.configure(move |app| app.declare_routes([route]))
    }

    pub fn routes(self, routes: impl IntoIterator<Item = RouteDef>) -> Self {
        let routes: Vec<_> = routes.into_iter().collect();
        self.configure(move |app| app.declare_routes(routes))
    }

    /// Stores shared application state, see [`AppContext::state`].
    pub fn state<T: Send + Sync + 'static>(self, value: T) -> Self {
        self.configure(move |app| {
            app.insert_state(value);
            Ok(())
        })
    }

    /// Runs arbitrary setup against the context, e.g. registering hooks.
    pub fn configure<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&AppContext) -> Result<(), LoadError> + Send + 'static,
    {
        self.setup.push(Box::new(f));
        self
    }

    // ─── Build ───────────────────────────────────────────────────────────────

    /// Resolves configuration, prepares the context and constructs every
    /// active module.
    pub fn build(self) -> RuntimeResult<KeelRuntime> {
        let defaults = self.registry.default_config();
        let config = match self.config {
            Some(mut config) => {
                for (name, default) in defaults.modules {
                    config.modules.entry(name).or_insert(default);
                }
                validate_config(&config)?;
                config
            }
            None => self.config_loader.defaults(defaults).load()?,
        };

        let app = Arc::new(AppContext::new(config.app.name.clone()));
        for setup in self.setup {
            setup(&app)?;
        }

        let modules = self.registry.load(&app, &config)?;
        let lifecycle = Lifecycle::new(modules, config.stop_timeout());

        info!(
            app = %config.app.name,
            init_order = ?lifecycle.order().init,
            "runtime built"
        );

        Ok(KeelRuntime {
            config,
            app,
            lifecycle,
        })
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::{AppError, Method, Module, Request, async_trait};
    use keel_framework::{
        AuthRequirement, Controller, HookPoint, Pipeline, Schema, SectionSchemas, handler_fn,
    };
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use tokio_test::{assert_err, assert_ok};

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        journal: Journal,
    }

    #[async_trait]
    impl Module for Recorder {
        async fn init(&self) -> Result<(), BoxError> {
            self.journal.lock().push(format!("init:{}", self.name));
            Ok(())
        }

        async fn stop(&self) -> Result<(), BoxError> {
            self.journal.lock().push(format!("stop:{}", self.name));
            Ok(())
        }
    }

    /// Resolved config with the logger off to keep test output quiet.
    fn quiet() -> KeelConfig {
        let mut config = KeelConfig::default();
        if let Some(logger) = config.modules.get_mut("logger") {
            logger.active = false;
        }
        config
    }

    fn recorder(
        builder: RuntimeBuilder,
        name: &'static str,
        priority: Priority,
        journal: &Journal,
    ) -> RuntimeBuilder {
        let journal = Arc::clone(journal);
        builder.module(name, priority, move |_, _| {
            Ok(Arc::new(Recorder {
                name,
                journal: Arc::clone(&journal),
            }))
        })
    }

    #[tokio::test]
    async fn init_order_follows_priorities() {
        let journal = Journal::default();
        let builder = KeelRuntime::builder().config(quiet());
        let builder = recorder(builder, "cache", Priority::default(), &journal);
        let builder = recorder(builder, "store", Priority::new(-10, 0, 0), &journal);
        let runtime = builder.build().unwrap();

        assert_ok!(runtime.init().await);
        let init: Vec<_> = journal.lock().clone();
        assert_eq!(init, ["init:store", "init:cache"]);

        // Framework modules come first with their negative priorities.
        assert_eq!(
            runtime.order().init,
            ["validator", "auth", "router", "store", "cache"]
        );
    }

    #[tokio::test]
    async fn reversing_priorities_reverses_init() {
        let journal = Journal::default();
        let builder = KeelRuntime::builder().config(quiet());
        let builder = recorder(builder, "cache", Priority::new(-10, 0, 0), &journal);
        let builder = recorder(builder, "store", Priority::default(), &journal);
        let runtime = builder.build().unwrap();

        assert_ok!(runtime.init().await);
        assert_eq!(*journal.lock(), ["init:cache", "init:store"]);
    }

    #[tokio::test]
    async fn configuration_can_deactivate_application_modules() {
        let journal = Journal::default();
        let mut config = quiet();
        config
            .modules
            .insert("store".into(), ModuleConfig::inactive(Priority::default()));

        let builder = KeelRuntime::builder().config(config);
        let runtime = recorder(builder, "store", Priority::default(), &journal)
            .build()
            .unwrap();

        assert!(runtime.module("store").is_none());
        assert_ok!(runtime.init().await);
        assert!(journal.lock().is_empty());
    }

    #[test]
    fn unknown_configured_module_fails_build() {
        let mut config = quiet();
        config
            .modules
            .insert("mailer".into(), ModuleConfig::active(Priority::default()));

        let err = KeelRuntime::builder().config(config).build().unwrap_err();
        assert_eq!(err.code(), "MODULE_DOES_NOT_EXIST");
    }

    #[tokio::test]
    async fn hooks_freeze_after_init() {
        let runtime = KeelRuntime::builder()
            .config(quiet())
            .configure(|app| {
                app.hooks()
                    .add_pre_fn(HookPoint::Request, |req| {
                        req.local.insert(7u8);
                        Ok(())
                    })
            })
            .build()
            .unwrap();

        assert_ok!(runtime.init().await);
        let late = runtime
            .app()
            .hooks()
            .add_pre_fn(HookPoint::Request, |_| Ok(()));
        assert_eq!(late, Err(LoadError::HooksFrozen));
    }

    #[tokio::test]
    async fn requests_flow_after_init() {
        let runtime = KeelRuntime::builder()
            .config(quiet())
            .route((
                Method::Get,
                "/sum",
                Controller::new(
                    "adds two numbers",
                    handler_fn(|_, req, _| {
                        let x = req.query["x"].as_i64().unwrap_or_default();
                        let y = req.query["y"].as_i64().unwrap_or_default();
                        Ok(json!(x + y))
                    }),
                )
                .validate(
                    SectionSchemas::new().query(
                        Schema::object()
                            .key("x", Schema::number().required())
                            .key("y", Schema::number().required()),
                    ),
                ),
            ))
            .build()
            .unwrap();
        assert_ok!(runtime.init().await);

        let pipeline = Pipeline::new(Arc::clone(runtime.app()), "test");
        let req = Request::new(Method::Get, "/sum")
            .with_query("x", "2")
            .with_query("y", "40");
        let res = assert_ok!(pipeline.handle(req).await);
        assert_eq!(res.body, json!(42));

        let req = Request::new(Method::Get, "/sum").with_query("x", "two");
        let err: AppError = assert_err!(pipeline.handle(req).await);
        assert!(err.is_status(400));
        assert_eq!(err.details.as_ref().unwrap()["section"], "query");
    }

    #[tokio::test]
    async fn routes_with_unknown_auth_abort_init() {
        let runtime = KeelRuntime::builder()
            .config(quiet())
            .route((
                Method::Get,
                "/me",
                Controller::new("me", handler_fn(|_, _, _| Ok(Value::Null)))
                    .auth(AuthRequirement::new("token").mode("required")),
            ))
            .build()
            .unwrap();

        let err = assert_err!(runtime.init().await);
        let app_err = AppError::from(err);
        assert!(app_err.is_code("LIFECYCLE_ERROR"));
        assert_eq!(app_err.details.unwrap()["module"], "router");
    }

    #[tokio::test]
    async fn run_until_drives_all_phases() {
        let journal = Journal::default();
        let builder = KeelRuntime::builder().config(quiet());
        let runtime = recorder(builder, "store", Priority::default(), &journal)
            .build()
            .unwrap();

        assert_ok!(runtime.run_until(async {}).await);
        assert_eq!(*journal.lock(), ["init:store", "stop:store"]);

        let dates = runtime.dates();
        assert!(dates.initialized_at.is_some());
        assert!(dates.started_at.is_some());
        assert!(dates.stopped_at.is_some());
        assert_eq!(runtime.states(), LifecycleStates::default());
    }
}
