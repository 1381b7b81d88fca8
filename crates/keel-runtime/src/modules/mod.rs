//! Framework modules contributed to `BUILTIN_MODULES`.
//!
//! | module      | init  | start | stop |
//! |-------------|-------|-------|------|
//! | `logger`    | -1000 | -1000 | 1000 |
//! | `validator` |  -990 |  -990 |  990 |
//! | `auth`      |  -950 |  -950 |  950 |
//! | `router`    |  -900 |  -900 |  900 |

pub mod auth;
pub mod logger;
pub mod router;
pub mod validator;

pub use auth::AuthModule;
pub use logger::LoggerModule;
pub use router::RouterModule;
pub use validator::ValidatorModule;
