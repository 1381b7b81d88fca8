//! Keel Runtime - configuration, logging and lifecycle orchestration.
//!
//! This crate provides:
//! - Layered configuration loading (`ConfigLoader`, `KeelConfig`)
//! - Logging setup on `tracing-subscriber` (`LoggingBuilder`)
//! - The typed module registry (`ModuleRegistry`)
//! - The per-phase lifecycle orchestrator (`Lifecycle`)
//! - The runtime entry point (`KeelRuntime`, `RuntimeBuilder`)
//! - The framework modules `logger`, `validator`, `auth` and `router`
//!
//! ```ignore
//! use keel_runtime::KeelRuntime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = KeelRuntime::builder()
//!         .routes(routes())
//!         .build()?;
//!
//!     // init, start, wait for Ctrl+C / SIGTERM, stop
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod modules;
pub mod registry;
pub mod runtime;

pub use config::{ConfigError, ConfigLoader, ConfigResult, KeelConfig, Profile};
pub use error::{RuntimeError, RuntimeResult};
pub use lifecycle::{Lifecycle, LifecycleDates, LifecycleStates, ModuleOrder, PhaseRun};
pub use logging::{LoggingBuilder, SpanEvents};
pub use registry::{LoadedModule, ModuleRegistry};
pub use runtime::{KeelRuntime, RuntimeBuilder};

// Re-export tracing for use by application crates
pub use tracing;

/// Logging macros for application code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
