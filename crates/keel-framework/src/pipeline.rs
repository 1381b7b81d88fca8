//! The per-request pipeline.
//!
//! [`Pipeline::handle`] drives one request through its stages:
//!
//! ```text
//! received → request hooks → controller hooks → route selection
//!          → auth hooks → auth resolution → validation
//!          → handler hooks → handler → response fold → sent
//! ```
//!
//! Any failure before the handler stage ends the request immediately. The
//! outcome of the handler stage (handler hooks plus the handler), success or
//! error, is threaded through the response fold, so response hooks also see
//! those failures. Application errors keep their uniform shape; anything
//! else, panics included, is logged in full and replaced by
//! [`AppError::internal`].
//!
//! # Tower Service Integration
//!
//! `Pipeline` implements `tower::Service<Request>`, so transports can stack
//! tower middleware in front of it:
//!
//! ```rust,ignore
//! use tower::ServiceBuilder;
//! use tower::limit::ConcurrencyLimitLayer;
//!
//! let service = ServiceBuilder::new()
//!     .layer(ConcurrencyLimitLayer::new(64))
//!     .service(Pipeline::new(app, "http"));
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::FutureExt;
use futures::future::BoxFuture;
use keel_core::{AppError, BoxError, Reply, Request, Response, generate_request_id};
use serde_json::Value;
use tower::Service;
use tracing::{Instrument, error, info, info_span, warn};

use crate::auth;
use crate::context::AppContext;
use crate::hooks::HookPoint;
use crate::validation::{Validator, validate_request};

/// Turns decoded requests into responses for one transport.
#[derive(Clone)]
pub struct Pipeline {
    app: Arc<AppContext>,
    transport: Arc<str>,
}

impl Pipeline {
    pub fn new(app: Arc<AppContext>, transport: impl Into<String>) -> Self {
        Self {
            app,
            transport: Arc::from(transport.into()),
        }
    }

    pub fn app(&self) -> &Arc<AppContext> {
        &self.app
    }

    /// Transport kind stamped on requests that carry none.
    pub fn transport(&self) -> &str {
        &self.transport
    }

    /// Runs `req` through every stage.
    pub async fn handle(&self, mut req: Request) -> Result<Response, AppError> {
        if req.kind.is_none() {
            req.kind = Some(self.transport.to_string());
        }
        if req.started_at.is_none() {
            req.started_at = Some(Instant::now());
        }
        let id = req.id.get_or_insert_with(generate_request_id).clone();

        let span = info_span!(
            "request",
            id = %id,
            method = %req.method,
            path = %req.path,
            transport = %req.kind(),
        );
        self.run(req).instrument(span).await
    }

    async fn run(&self, mut req: Request) -> Result<Response, AppError> {
        info!(from = req.from.as_deref().unwrap_or("-"), "request received");

        let result = match AssertUnwindSafe(self.dispatch(&mut req)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                error!(panic = panic_message(&*panic), "request stage panicked");
                Err(AppError::internal())
            }
        };
        let elapsed = req.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;

        match result {
            Ok((body, reply)) => {
                let response = Response {
                    id: req.id().to_string(),
                    body,
                    reply,
                    elapsed,
                };
                info!(status = response.status(), elapsed_ms, "request completed");
                Ok(response)
            }
            Err(err) => {
                warn!(code = %err.code, message = %err.message, elapsed_ms, "request failed");
                Err(err)
            }
        }
    }

    async fn dispatch(&self, req: &mut Request) -> Result<(Value, Reply), AppError> {
        let app = &*self.app;
        let hooks = app.hooks();

        hooks
            .run(HookPoint::Request, app, req, None)
            .await
            .map_err(coerce)?;

        // Controller selection.
        hooks
            .run(HookPoint::Controller, app, req, None)
            .await
            .map_err(coerce)?;
        let router = app.router().ok_or_else(|| {
            error!("no router installed, is the router module active?");
            AppError::internal()
        })?;
        let route = router.select(req)?;
        let controller = &*route.controller;

        // Auth.
        hooks
            .run(HookPoint::Auth, app, req, Some(controller))
            .await
            .map_err(coerce)?;
        req.auth = auth::resolve(app, req, controller.auth_requirement())
            .await
            .map_err(coerce)?;

        // Validation.
        if let Some(schemas) = &route.schemas {
            let fallback;
            let validator = match app.validator() {
                Some(validator) => validator,
                None => {
                    fallback = Validator::default();
                    &fallback
                }
            };
            validate_request(req, schemas, validator)?;
        }

        // Handler hooks and the handler form one stage; either outcome is folded.
        let mut reply = Reply::new();
        let outcome = match hooks
            .run(HookPoint::Handler, app, req, Some(controller))
            .await
        {
            Err(err) => Err(coerce(err)),
            Ok(()) => {
                let call = controller.handler().call(app, req, &mut reply);
                match AssertUnwindSafe(call).catch_unwind().await {
                    Ok(result) => result.map_err(coerce),
                    Err(panic) => {
                        error!(panic = panic_message(&*panic), route = %route.label(), "handler panicked");
                        Err(AppError::internal())
                    }
                }
            }
        };

        hooks
            .fold_response(app, req, controller, outcome)
            .await
            .map(|body| (body, reply))
    }
}

/// Keeps application errors, replaces everything else with an internal error.
fn coerce(err: BoxError) -> AppError {
    AppError::from_boxed(err).unwrap_or_else(|other| {
        error!(error = ?other, "unexpected error");
        AppError::internal()
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

impl Service<Request> for Pipeline {
    type Response = Response;
    type Error = AppError;
    type Future = BoxFuture<'static, Result<Response, AppError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let pipeline = self.clone();
        Box::pin(async move { pipeline.handle(req).await })
    }
}
