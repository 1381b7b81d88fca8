//! Request methods.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An HTTP-style request method, or the route wildcard [`Method::All`].
///
/// Message-queue transports reuse the same set: a queued request carries a
/// method name just like an HTTP request does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
    /// Route wildcard matching every request method.
    All,
}

/// Returned when a method name is not part of the supported set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown request method '{0}'")]
pub struct UnknownMethod(pub String);

impl Method {
    /// Every supported method, wildcard last.
    pub const ALL_METHODS: [Method; 10] = [
        Method::Get,
        Method::Head,
        Method::Post,
        Method::Put,
        Method::Delete,
        Method::Connect,
        Method::Options,
        Method::Trace,
        Method::Patch,
        Method::All,
    ];

    /// Upper-case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
            Method::All => "ALL",
        }
    }

    /// Returns `true` for the [`Method::All`] wildcard.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Method::All)
    }

    /// Returns `true` if a route declared with `self` accepts a request made
    /// with `request`.
    pub fn accepts(&self, request: Method) -> bool {
        self.is_wildcard() || *self == request
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        Method::ALL_METHODS
            .iter()
            .copied()
            .find(|m| m.as_str() == upper)
            .ok_or_else(|| UnknownMethod(s.to_string()))
    }
}
