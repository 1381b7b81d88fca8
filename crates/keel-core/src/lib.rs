//! # Keel Core
//!
//! Foundation types shared by every Keel crate.
//!
//! - **Uniform errors**: [`AppError`] and [`ErrorCode`], the `{code, message,
//!   details}` shape that crosses every boundary
//! - **Requests**: [`Request`], [`Section`], [`Local`] and [`Method`]
//! - **Responses**: [`Reply`] and [`Response`]
//! - **Modules**: the [`Module`] and [`ServerModule`] capability traits with
//!   their per-phase [`Priority`]
//!
//! ```text
//! transport ──▶ Request ──▶ pipeline ──▶ Result<Response, AppError> ──▶ transport
//! ```

pub mod error;
pub mod local;
pub mod method;
pub mod module;
pub mod request;
pub mod response;

pub use error::{AppError, BoxError, ErrorCode, INTERNAL_ERROR};
pub use local::Local;
pub use method::{Method, UnknownMethod};
pub use module::{BoxedModule, BoxedServer, Module, Phase, Priority, ServerModule};
pub use request::{Request, Section, generate_request_id};
pub use response::{Reply, Response};

/// Re-exported so implementors do not need their own dependency.
pub use async_trait::async_trait;
