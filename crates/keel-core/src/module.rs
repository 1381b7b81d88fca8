//! Module capability contract.
//!
//! Every unit the runtime drives through its lifecycle implements [`Module`].
//! Transport modules additionally implement [`ServerModule`] and advertise it
//! through [`Module::as_server`], which is how the registry checks the
//! server capability set without runtime reflection.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, BoxError};
use crate::request::Request;
use crate::response::Response;

// =============================================================================
// Phase & Priority
// =============================================================================

/// A lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Init,
    Start,
    Stop,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::Start => "start",
            Phase::Stop => "stop",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-phase ordering priorities; lower runs first, absent values are `0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Priority {
    pub init: i32,
    pub start: i32,
    pub stop: i32,
}

impl Priority {
    pub const fn new(init: i32, start: i32, stop: i32) -> Self {
        Self { init, start, stop }
    }

    /// Priority for the given phase.
    pub fn get(&self, phase: Phase) -> i32 {
        match phase {
            Phase::Init => self.init,
            Phase::Start => self.start,
            Phase::Stop => self.stop,
        }
    }
}

// =============================================================================
// Module traits
// =============================================================================

/// A named unit with an init/start/stop lifecycle.
///
/// Implementing the trait is the capability check: every `dyn Module` has
/// all three phases. They default to doing nothing so that simple modules
/// only implement the phases they care about. The only capability checked at
/// load time is the server one, see [`Module::as_server`].
#[async_trait]
pub trait Module: Send + Sync + 'static {
    /// Registers hooks and capabilities. Runs before any module starts.
    async fn init(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Begins serving.
    async fn start(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Releases resources.
    async fn stop(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Exposes the server capability, if this module has it.
    fn as_server(self: Arc<Self>) -> Option<Arc<dyn ServerModule>> {
        None
    }
}

/// A module that turns transport input into pipeline requests.
#[async_trait]
pub trait ServerModule: Module {
    /// Transport kind stamped on requests (`"http"`, `"amqp"`, ...).
    fn transport(&self) -> &str;

    /// Runs one decoded request through the pipeline.
    async fn handle_request(&self, req: Request) -> Result<Response, AppError>;
}

/// Shared handle to a module instance.
pub type BoxedModule = Arc<dyn Module>;

/// Shared handle to a server module instance.
pub type BoxedServer = Arc<dyn ServerModule>;

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;

    #[async_trait]
    impl Module for Plain {}

    #[test]
    fn priority_defaults_to_zero() {
        let p: Priority = serde_json::from_value(serde_json::json!({ "init": -10 })).unwrap();
        assert_eq!(p.get(Phase::Init), -10);
        assert_eq!(p.get(Phase::Start), 0);
        assert_eq!(p.get(Phase::Stop), 0);
    }

    #[tokio::test]
    async fn default_phases_succeed() {
        let module: BoxedModule = Arc::new(Plain);
        assert!(module.init().await.is_ok());
        assert!(module.stop().await.is_ok());
        assert!(module.as_server().is_none());
    }
}
