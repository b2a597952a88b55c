//! Bearer-token guard for the admin endpoints.

use crate::AppResources;
use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error type for authentication failures
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthError {
    /// Error code (e.g., "invalid_token")
    pub error: String,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl AuthError {
    pub fn invalid_token(description: impl Into<String>) -> Self {
        Self {
            error: "invalid_token".to_string(),
            error_description: Some(description.into()),
        }
    }

    pub fn server_error() -> Self {
        Self {
            error: "server_error".to_string(),
            error_description: None,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self.error.as_str() {
            "invalid_token" => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

/// Compares without short-circuiting on the first differing byte.
fn tokens_match(given: &str, expected: &str) -> bool {
    let (a, b) = (given.as_bytes(), expected.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Admits the request when no admin token is configured, or when
/// `Authorization: Bearer <admin_token>` matches it.
pub struct AdminAuth;

impl<S> FromRequestParts<S> for AdminAuth
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let resources = parts
            .extensions
            .get::<AppResources>()
            .cloned()
            .ok_or_else(|| {
                tracing::error!(
                    name = "api.auth.resources_missing",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    message = "AppResources not found in extensions"
                );
                AuthError::server_error()
            })?;

        let Some(expected) = resources.config.admin_token.as_deref() else {
            return Ok(AdminAuth);
        };

        let header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok());

        match header.and_then(|h| h.strip_prefix("Bearer ")) {
            Some(token) if tokens_match(token.trim(), expected) => Ok(AdminAuth),
            Some(_) => {
                tracing::warn!(
                    name = "api.auth.rejected",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    message = "Admin request with wrong token"
                );
                Err(AuthError::invalid_token("Invalid admin token"))
            }
            None if header.is_some() => Err(AuthError::invalid_token(
                "Authorization header must use Bearer scheme",
            )),
            None => Err(AuthError::invalid_token("Missing Authorization header")),
        }
    }
}
