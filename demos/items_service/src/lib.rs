//! Items Service
//!
//! A small item catalogue on the Keel runtime:
//!
//! | Route            | Auth                      | Validation                     |
//! |------------------|---------------------------|--------------------------------|
//! | `GET /items`     | `basic-auth`, try         |                                |
//! | `POST /items`    | `basic-auth`, required    | body: `title`, positive `price`|
//! | `GET /items/:id` | `basic-auth`, try         | params: integer `id`           |
//! | `ALL /ping`      | `basic-auth`, try         | query: numeric `x`, `y`        |
//!
//! The library exposes the assembled [`RuntimeBuilder`] so that the binary
//! and the tests share one wiring.

pub mod auth;
pub mod controllers;
pub mod store;

use keel::prelude::*;

pub use auth::{BASIC_AUTH, BasicAuth};
pub use store::{Item, ItemStore};

/// A runtime builder with the store, the auth provider and every route.
pub fn service() -> RuntimeBuilder {
    KeelRuntime::builder()
        .name("items-service")
        .state(ItemStore::new())
        .auth_provider(
            BASIC_AUTH,
            BasicAuth::new().account("keel", "password", &["user"]),
        )
        .routes(controllers::routes())
}
