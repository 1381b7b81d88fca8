//! # Keel
//!
//! A pluggable application runtime: named modules with a prioritised
//! init/start/stop lifecycle, a request pipeline with hook chains, route
//! matching, pluggable authentication and declarative validation.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐     ┌──────────────────────────────────────────────────────────┐
//! │ Transport │────▶│ Pipeline: hooks → route → auth → validate → handler → fold│
//! │ (server   │◀────│           (one Request per execution)                     │
//! │  module)  │     └──────────────────────────────────────────────────────────┘
//! └───────────┘
//!       ▲
//!       │ init / start / stop, by per-phase priority
//! ┌───────────┐
//! │  Runtime  │  logger · validator · auth · router · web-server · app modules
//! └───────────┘
//! ```
//!
//! - **Runtime**: loads configuration, constructs the active modules and
//!   drives their lifecycle
//! - **Modules**: units with optional init/start/stop phases; server modules
//!   also feed requests into the pipeline
//! - **Controllers**: a handler plus its auth requirement and validation
//!   schemas, bound to a method and path
//! - **Hooks**: ordered chains at fixed pipeline points, plus a response fold
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use keel::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = KeelRuntime::builder()
//!         .route((
//!             Method::Get,
//!             "/ping",
//!             Controller::new("Ping", handler_fn(|_, _, _| Ok(json!("pong")))),
//!         ))
//!         .set("modules.web-server.active", true)
//!         .build()?;
//!
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output
//! - `http-server`: the `web-server` HTTP module
//! - `full-transport`: every transport module

pub use keel_core as core;
pub use keel_framework as framework;
pub use keel_runtime as runtime;
pub use keel_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use keel::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use keel_runtime::{KeelConfig, KeelRuntime, RuntimeBuilder};

    // Controllers and routes
    pub use keel_framework::{
        Controller, Handler, RouteDef, Schema, SectionSchemas, handler_fn,
    };

    // Auth
    pub use keel_framework::{AuthMode, AuthProvider, AuthRequirement};

    // Hooks and shared capabilities
    pub use keel_framework::{AppContext, HookPoint, ModuleConfig, Outcome};

    // Request and response types
    pub use keel_core::{AppError, BoxError, Method, Reply, Request, Response, Section};

    // Module traits for custom implementations
    pub use keel_core::{Module, Priority, ServerModule, async_trait};

    #[cfg(feature = "http-server")]
    pub use keel_transport::WebServerModule;
}
