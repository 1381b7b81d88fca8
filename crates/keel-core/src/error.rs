//! The uniform error shape that crosses every boundary of a Keel application.
//!
//! Every deliberate, application-level failure (routing misses, auth
//! rejections, validation failures, business errors raised by handlers) is an
//! [`AppError`]: a `{code, message, details}` triple that serialises the same
//! way regardless of the transport that eventually delivers it.
//!
//! Application code returns [`BoxError`] so that `?` works with any error type.
//! The request pipeline later calls [`AppError::from_boxed`] to tell an
//! [`AppError`] apart from an unexpected failure.

use std::fmt;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Boxed error type returned by handlers, hooks and auth providers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Code used when an unexpected error is coerced into the uniform shape.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

// =============================================================================
// ErrorCode
// =============================================================================

/// The `code` part of the uniform error shape.
///
/// A numeric code inside the HTTP status range is interpreted as a status by
/// transports; a string code is an application-defined identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorCode {
    /// Numeric code, usually an HTTP status.
    Status(u16),
    /// Symbolic code such as `"TIMEOUT_ERROR"`.
    Name(String),
}

impl ErrorCode {
    /// Returns the numeric code when it lies inside the HTTP status range.
    pub fn as_status(&self) -> Option<StatusCode> {
        match self {
            Self::Status(code) if (100..=599).contains(code) => StatusCode::from_u16(*code).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(code) => write!(f, "{code}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl From<u16> for ErrorCode {
    fn from(code: u16) -> Self {
        Self::Status(code)
    }
}

impl From<&str> for ErrorCode {
    fn from(code: &str) -> Self {
        Self::Name(code.to_string())
    }
}

impl From<String> for ErrorCode {
    fn from(code: String) -> Self {
        Self::Name(code)
    }
}

// =============================================================================
// AppError
// =============================================================================

/// Application-level error in the uniform `{code, message, details}` shape.
///
/// # Example
///
/// ```rust
/// use keel_core::AppError;
///
/// let err = AppError::status(404);
/// assert_eq!(err.message, "Not Found");
///
/// let err = AppError::new("ITEM_LOCKED", "item is locked")
///     .with_details(serde_json::json!({ "id": 7 }));
/// assert_eq!(err.http_status(), 500);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppError {
    /// Numeric status or symbolic code.
    pub code: ErrorCode,
    /// Human readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl AppError {
    /// Creates an error with the given code and message.
    ///
    /// When `message` is empty and `code` is a known HTTP status, the standard
    /// reason phrase is used instead.
    pub fn new(code: impl Into<ErrorCode>, message: impl Into<String>) -> Self {
        let code = code.into();
        let mut message = message.into();
        if message.is_empty()
            && let ErrorCode::Status(status) = code
        {
            message = StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or_default()
                .to_string();
        }
        Self {
            code,
            message,
            details: None,
        }
    }

    /// Creates an error carrying a numeric status and its reason phrase.
    pub fn status(status: u16) -> Self {
        Self::new(status, "")
    }

    /// The generic shape unexpected errors are coerced into.
    pub fn internal() -> Self {
        Self::new(INTERNAL_ERROR, "Internal error")
    }

    /// Attaches structured details.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Returns `true` if the code is the given numeric status.
    pub fn is_status(&self, status: u16) -> bool {
        self.code == ErrorCode::Status(status)
    }

    /// Returns `true` if the code is the given symbolic name.
    pub fn is_code(&self, name: &str) -> bool {
        matches!(&self.code, ErrorCode::Name(n) if n == name)
    }

    /// Status a transport should answer with for this error.
    pub fn http_status(&self) -> u16 {
        self.code
            .as_status()
            .map(|s| s.as_u16())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR.as_u16())
    }

    /// Recovers an [`AppError`] from a boxed error.
    ///
    /// Returns the original box unchanged when it holds anything else.
    pub fn from_boxed(err: BoxError) -> Result<Self, BoxError> {
        err.downcast::<AppError>().map(|e| *e)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = serde_json::to_string(&self.code).unwrap_or_default();
        let message = serde_json::to_string(&self.message).unwrap_or_default();
        let details = match &self.details {
            Some(details) => details.to_string(),
            None => "undefined".to_string(),
        };
        write!(
            f,
            "AppError: {{code: {code}, message: {message}, details: {details}}}"
        )
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_code_gets_reason_phrase() {
        let err = AppError::status(405);
        assert_eq!(err.message, "Method Not Allowed");
        assert!(err.is_status(405));
        assert_eq!(err.http_status(), 405);
    }

    #[test]
    fn explicit_message_is_kept() {
        let err = AppError::new(401u16, "token expired");
        assert_eq!(err.message, "token expired");
    }

    #[test]
    fn named_codes_map_to_500() {
        let err = AppError::new("TIMEOUT_ERROR", "too slow");
        assert!(err.is_code("TIMEOUT_ERROR"));
        assert_eq!(err.http_status(), 500);
        assert_eq!(AppError::new(42u16, "").http_status(), 500);
    }

    #[test]
    fn serialises_uniform_shape() {
        let err = AppError::status(400).with_details(json!({ "section": "query" }));
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(
            value,
            json!({ "code": 400, "message": "Bad Request", "details": { "section": "query" } })
        );

        let value = serde_json::to_value(AppError::internal()).unwrap();
        assert_eq!(value, json!({ "code": "INTERNAL_ERROR", "message": "Internal error" }));
    }

    #[test]
    fn display_matches_shape() {
        let err = AppError::new("NO_AUTH", "missing");
        assert_eq!(
            err.to_string(),
            r#"AppError: {code: "NO_AUTH", message: "missing", details: undefined}"#
        );
    }

    #[test]
    fn downcasts_from_box() {
        let boxed: BoxError = AppError::status(401).into();
        let err = AppError::from_boxed(boxed).unwrap();
        assert!(err.is_status(401));

        let boxed: BoxError = "plain failure".into();
        assert!(AppError::from_boxed(boxed).is_err());
    }
}
