//! # Keel Framework
//!
//! The request-dispatch engine of the Keel application runtime.
//!
//! This layer provides:
//! - [`AppContext`], the capabilities shared by modules and requests
//! - Hook chains at the request, controller, auth, handler and response points
//! - Pluggable auth providers with named modes
//! - Controllers, route declarations and the [`Router`]
//! - The validation gate and its schema engine
//! - The per-request [`Pipeline`], usable as a `tower::Service`
//! - Module descriptors and the [`BUILTIN_MODULES`] table that framework
//!   crates contribute default modules to

pub mod auth;
pub mod context;
pub mod controller;
pub mod error;
pub mod hooks;
pub mod module;
pub mod pipeline;
pub mod routing;
pub mod validation;

pub use auth::{
    AuthMode, AuthProvider, AuthRegistry, AuthRequirement, RequiredMode, TryMode, standard_mode,
};
pub use context::AppContext;
pub use controller::{Controller, Handler, HandlerFn, handler_fn};
pub use error::LoadError;
pub use hooks::{Hook, HookPoint, HookRegistry, Outcome, ResponseHook};
pub use module::{
    BUILTIN_MODULES, ModuleConfig, ModuleDescriptor, ModuleFactory, ModuleKind, builtin_module,
};
pub use pipeline::Pipeline;
pub use routing::{PathPattern, Route, RouteDef, Router, Segment};
pub use validation::{
    Schema, SectionSchemas, ValidationIssue, Validator, validate_request,
};

/// Re-exported for crates contributing to [`BUILTIN_MODULES`].
pub use linkme;
