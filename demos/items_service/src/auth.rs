//! The `basic-auth` provider.
//!
//! Reads `Authorization: Basic <base64(user:pass)>`. A request without
//! usable credentials has no identity; a request with credentials that do
//! not match is rejected with `401` whatever the mode. A requirement may
//! list scopes under `scope`; the user must hold all of them.

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use keel::framework::standard_mode;
use keel::prelude::*;
use serde_json::{Value, json};
use tracing::debug;

/// Name the provider is registered under.
pub const BASIC_AUTH: &str = "basic-auth";

struct Account {
    password: String,
    scopes: Vec<String>,
}

/// Username/password authentication against a fixed account list.
#[derive(Default)]
pub struct BasicAuth {
    accounts: HashMap<String, Account>,
}

impl BasicAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an account holding `scopes`.
    pub fn account(mut self, user: &str, password: &str, scopes: &[&str]) -> Self {
        self.accounts.insert(
            user.to_string(),
            Account {
                password: password.to_string(),
                scopes: scopes.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }
}

/// Extracts `(user, password)` from a basic authorization header.
fn credentials(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

fn required_scopes(requirement: &AuthRequirement) -> Vec<&str> {
    match requirement.extra.get("scope") {
        Some(Value::Array(scopes)) => scopes.iter().filter_map(Value::as_str).collect(),
        Some(Value::String(scope)) => vec![scope.as_str()],
        _ => Vec::new(),
    }
}

#[async_trait]
impl AuthProvider for BasicAuth {
    async fn auth(
        &self,
        _app: &AppContext,
        req: &Request,
        requirement: &AuthRequirement,
    ) -> Result<Option<Value>, BoxError> {
        let Some((user, password)) = req.header("authorization").and_then(credentials) else {
            return Ok(None);
        };

        let account = self
            .accounts
            .get(&user)
            .filter(|account| account.password == password)
            .ok_or_else(|| {
                debug!(user = %user, "rejected credentials");
                AppError::status(401)
            })?;

        let missing: Vec<_> = required_scopes(requirement)
            .into_iter()
            .filter(|scope| !account.scopes.iter().any(|s| s == scope))
            .collect();
        if !missing.is_empty() {
            return Err(AppError::status(403)
                .with_details(json!({ "missingScopes": missing }))
                .into());
        }

        Ok(Some(json!({ "id": user, "scopes": account.scopes })))
    }

    fn mode(&self, name: &str) -> Option<Arc<dyn AuthMode>> {
        standard_mode(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> BasicAuth {
        BasicAuth::new().account("keel", "password", &["user"])
    }

    fn header(user: &str, password: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
    }

    #[test]
    fn parses_basic_credentials() {
        assert_eq!(
            credentials(&header("keel", "pa:ss")),
            Some(("keel".to_string(), "pa:ss".to_string()))
        );
        assert_eq!(credentials("Bearer abc"), None);
        assert_eq!(credentials("Basic !!!"), None);
    }

    #[tokio::test]
    async fn missing_header_has_no_identity() {
        let app = AppContext::new("test");
        let req = Request::new(Method::Get, "/");
        let result = provider()
            .auth(&app, &req, &AuthRequirement::new(BASIC_AUTH))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let app = AppContext::new("test");
        let req = Request::new(Method::Get, "/").with_header("Authorization", header("keel", "nope"));
        let err = provider()
            .auth(&app, &req, &AuthRequirement::new(BASIC_AUTH))
            .await
            .unwrap_err();
        assert!(AppError::from_boxed(err).unwrap().is_status(401));
    }

    #[tokio::test]
    async fn scopes_are_enforced() {
        let app = AppContext::new("test");
        let req =
            Request::new(Method::Get, "/").with_header("Authorization", header("keel", "password"));

        let granted = provider()
            .auth(
                &app,
                &req,
                &AuthRequirement::new(BASIC_AUTH).with("scope", json!(["user"])),
            )
            .await
            .unwrap();
        assert_eq!(granted, Some(json!({ "id": "keel", "scopes": ["user"] })));

        let err = provider()
            .auth(
                &app,
                &req,
                &AuthRequirement::new(BASIC_AUTH).with("scope", json!(["admin"])),
            )
            .await
            .unwrap_err();
        assert!(AppError::from_boxed(err).unwrap().is_status(403));
    }
}
