//! Hook chains.
//!
//! Modules extend request handling by registering hooks during their init
//! phase. Four extension points are fire-and-forget: each hook sees the
//! mutable request and may fail it. The response point is a fold: each hook
//! receives the outcome produced so far and returns the outcome for the next
//! hook.
//!
//! Registration order is execution order. Once the runtime finishes the init
//! phase the registry is frozen and further registration fails with
//! [`LoadError::HooksFrozen`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use keel_core::{AppError, BoxError, Request};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::trace;

use crate::context::AppContext;
use crate::controller::Controller;
use crate::error::LoadError;

/// Result of a handler as threaded through the response chain.
pub type Outcome = Result<Value, AppError>;

/// A fire-and-forget extension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// Before anything else, for every request.
    Request,
    /// Before route selection.
    Controller,
    /// After route selection, before auth resolution.
    Auth,
    /// After validation, before the handler.
    Handler,
}

impl HookPoint {
    pub const ALL: [HookPoint; 4] = [
        HookPoint::Request,
        HookPoint::Controller,
        HookPoint::Auth,
        HookPoint::Handler,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookPoint::Request => "request",
            HookPoint::Controller => "controller",
            HookPoint::Auth => "auth",
            HookPoint::Handler => "handler",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Hook traits
// =============================================================================

/// A hook at one of the fire-and-forget extension points.
///
/// `controller` is `None` for the request and controller points, which run
/// before a route has been selected.
#[async_trait]
pub trait Hook: Send + Sync + 'static {
    async fn call(
        &self,
        app: &AppContext,
        req: &mut Request,
        controller: Option<&Controller>,
    ) -> Result<(), BoxError>;
}

/// A hook in the response fold.
#[async_trait]
pub trait ResponseHook: Send + Sync + 'static {
    async fn call(
        &self,
        app: &AppContext,
        req: &Request,
        controller: &Controller,
        outcome: Outcome,
    ) -> Outcome;
}

/// Adapts a synchronous closure into a [`Hook`].
pub struct HookFn<F>(F);

#[async_trait]
impl<F> Hook for HookFn<F>
where
    F: Fn(&mut Request) -> Result<(), BoxError> + Send + Sync + 'static,
{
    async fn call(
        &self,
        _app: &AppContext,
        req: &mut Request,
        _controller: Option<&Controller>,
    ) -> Result<(), BoxError> {
        (self.0)(req)
    }
}

/// Adapts a synchronous closure into a [`ResponseHook`].
pub struct ResponseHookFn<F>(F);

#[async_trait]
impl<F> ResponseHook for ResponseHookFn<F>
where
    F: Fn(&Request, Outcome) -> Outcome + Send + Sync + 'static,
{
    async fn call(
        &self,
        _app: &AppContext,
        req: &Request,
        _controller: &Controller,
        outcome: Outcome,
    ) -> Outcome {
        (self.0)(req, outcome)
    }
}

// =============================================================================
// HookRegistry
// =============================================================================

type HookList = Vec<Arc<dyn Hook>>;

/// The process-wide hook chains.
#[derive(Default)]
pub struct HookRegistry {
    pre: [RwLock<HookList>; 4],
    response: RwLock<Vec<Arc<dyn ResponseHook>>>,
    frozen: AtomicBool,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a hook to a fire-and-forget chain.
    pub fn add_pre(&self, point: HookPoint, hook: impl Hook) -> Result<(), LoadError> {
        self.ensure_open()?;
        self.pre[point.index()].write().push(Arc::new(hook));
        Ok(())
    }

    /// Appends a synchronous closure to a fire-and-forget chain.
    pub fn add_pre_fn<F>(&self, point: HookPoint, f: F) -> Result<(), LoadError>
    where
        F: Fn(&mut Request) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.add_pre(point, HookFn(f))
    }

    /// Appends a hook to the response fold.
    pub fn add_response(&self, hook: impl ResponseHook) -> Result<(), LoadError> {
        self.ensure_open()?;
        self.response.write().push(Arc::new(hook));
        Ok(())
    }

    /// Appends a synchronous closure to the response fold.
    pub fn add_response_fn<F>(&self, f: F) -> Result<(), LoadError>
    where
        F: Fn(&Request, Outcome) -> Outcome + Send + Sync + 'static,
    {
        self.add_response(ResponseHookFn(f))
    }

    /// Rejects any further registration.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::SeqCst);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    /// Number of hooks registered at `point`.
    pub fn len(&self, point: HookPoint) -> usize {
        self.pre[point.index()].read().len()
    }

    /// Number of response hooks.
    pub fn response_len(&self) -> usize {
        self.response.read().len()
    }

    /// Runs one fire-and-forget chain; the first failure aborts the chain.
    pub async fn run(
        &self,
        point: HookPoint,
        app: &AppContext,
        req: &mut Request,
        controller: Option<&Controller>,
    ) -> Result<(), BoxError> {
        let hooks = self.pre[point.index()].read().clone();
        for (index, hook) in hooks.iter().enumerate() {
            trace!(point = %point, index, "running hook");
            hook.call(app, req, controller).await?;
        }
        Ok(())
    }

    /// Threads `outcome` through the response chain.
    pub async fn fold_response(
        &self,
        app: &AppContext,
        req: &Request,
        controller: &Controller,
        mut outcome: Outcome,
    ) -> Outcome {
        let hooks = self.response.read().clone();
        for hook in hooks.iter() {
            outcome = hook.call(app, req, controller, outcome).await;
        }
        outcome
    }

    fn ensure_open(&self) -> Result<(), LoadError> {
        if self.is_frozen() {
            Err(LoadError::HooksFrozen)
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("HookRegistry");
        for point in HookPoint::ALL {
            s.field(point.as_str(), &self.len(point));
        }
        s.field("response", &self.response_len())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{Controller, handler_fn};
    use keel_core::Method;
    use serde_json::json;

    fn controller() -> Controller {
        Controller::new("test", handler_fn(|_, _, _| Ok(json!({}))))
    }

    #[derive(Debug, Default)]
    struct Trail(Vec<&'static str>);

    fn mark(req: &mut Request, name: &'static str) {
        if !req.local.contains::<Trail>() {
            req.local.insert(Trail::default());
        }
        if let Some(trail) = req.local.get_mut::<Trail>() {
            trail.0.push(name);
        }
    }

    #[tokio::test]
    async fn chain_runs_in_registration_order() {
        let app = AppContext::new("test");
        let hooks = app.hooks();
        hooks
            .add_pre_fn(HookPoint::Request, |req| {
                mark(req, "first");
                Ok(())
            })
            .unwrap();
        hooks
            .add_pre_fn(HookPoint::Request, |req| {
                mark(req, "second");
                Ok(())
            })
            .unwrap();

        let mut req = Request::new(Method::Get, "/");
        hooks
            .run(HookPoint::Request, &app, &mut req, None)
            .await
            .unwrap();

        assert_eq!(req.local.get::<Trail>().unwrap().0, vec!["first", "second"]);
        assert_eq!(hooks.len(HookPoint::Auth), 0);
    }

    #[tokio::test]
    async fn failure_stops_the_chain() {
        let app = AppContext::new("test");
        let hooks = app.hooks();
        hooks
            .add_pre_fn(HookPoint::Auth, |_| Err(AppError::status(403).into()))
            .unwrap();
        hooks
            .add_pre_fn(HookPoint::Auth, |req| {
                mark(req, "unreachable");
                Ok(())
            })
            .unwrap();

        let mut req = Request::new(Method::Get, "/");
        let err = hooks
            .run(HookPoint::Auth, &app, &mut req, None)
            .await
            .unwrap_err();

        assert!(AppError::from_boxed(err).unwrap().is_status(403));
        assert!(!req.local.contains::<Trail>());
    }

    #[tokio::test]
    async fn response_chain_is_a_fold() {
        let app = AppContext::new("test");
        let hooks = app.hooks();
        for marker in ["a", "b"] {
            hooks
                .add_response_fn(move |_, outcome| {
                    outcome.map(|mut body| {
                        let mut markers = body["markers"].as_array().cloned().unwrap_or_default();
                        markers.push(json!(marker));
                        body["markers"] = Value::Array(markers);
                        body
                    })
                })
                .unwrap();
        }

        let req = Request::new(Method::Get, "/");
        let out = hooks
            .fold_response(&app, &req, &controller(), Ok(json!({})))
            .await
            .unwrap();

        assert_eq!(out, json!({ "markers": ["a", "b"] }));
    }

    #[test]
    fn frozen_registry_rejects_hooks() {
        let hooks = HookRegistry::new();
        hooks.freeze();
        let err = hooks.add_pre_fn(HookPoint::Handler, |_| Ok(())).unwrap_err();
        assert_eq!(err, LoadError::HooksFrozen);
    }
}
