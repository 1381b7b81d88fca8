//! HTTP transport.

#[cfg(feature = "http-server")]
mod codec;
#[cfg(feature = "http-server")]
mod server;
#[cfg(feature = "http-server")]
pub use server::{WEBSERVER_ERROR, WebServerModule, WebServerSettings};
