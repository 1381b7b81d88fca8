//! # Keel Transport
//!
//! Transport modules for the Keel application runtime.
//!
//! A transport module is a server module: it decodes what arrives on the
//! wire into a [`keel_core::Request`], hands it to the request pipeline and
//! encodes the outcome back. Each one registers itself in the framework
//! module table, so enabling it is a matter of configuration:
//!
//! ```toml
//! [modules.web-server]
//! active = true
//! port = 3000
//! ```
//!
//! ## Features
//!
//! - `http-server`: the `web-server` module, an axum HTTP server
//! - `full`: all transports
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  keel-runtime       │  (lifecycle drives init/start/stop)
//! ├─────────────────────┤
//! │  keel-transport     │  <- This crate (decode, dispatch, encode)
//! ├─────────────────────┤
//! │  keel-framework     │  (pipeline, router, auth, validation)
//! ├─────────────────────┤
//! │  Network (TCP/HTTP) │
//! └─────────────────────┘
//! ```

#[cfg(feature = "http-server")]
pub mod http;

#[cfg(feature = "http-server")]
pub use http::{WEBSERVER_ERROR, WebServerModule, WebServerSettings};
