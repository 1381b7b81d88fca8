//! Route matching.
//!
//! Routes are declared as [`RouteDef`]s, either as `(method, path, controller)`
//! tuples or per path with [`RouteDef::for_path`]. The `router` module turns
//! the declarations into an immutable [`Router`] during init, which is when
//! malformed paths, duplicates and missing auth capabilities are reported.

mod pattern;
mod route;
mod router;

pub use pattern::{PathPattern, Segment};
pub use route::{Route, RouteDef};
pub use router::Router;
