use axum::{
    Json,
    response::{IntoResponse, Response},
};
use hyper::StatusCode;
use sea_orm::DbErr;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// A failed attempt to hand one message to the email provider.
#[derive(Debug, Clone, Error)]
pub enum SendError {
    #[error("Provider rejected the message (HTTP {status}): {message}")]
    Provider {
        status: u16,
        /// Provider error identifier, e.g. `rate_limit_exceeded`.
        name: Option<String>,
        message: String,
        /// Value of the `Retry-After` response header, if any.
        retry_after: Option<Duration>,
    },
    #[error("SMTP error (code {code:?}): {message}")]
    Smtp { code: Option<u16>, message: String },
    #[error("Network error: {0}")]
    Transport(String),
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
    #[error("Rate limit: retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

/// SMTP replies that mean "slow down" rather than "never".
const TRANSIENT_SMTP_CODES: [u16; 4] = [421, 450, 451, 452];

fn mentions_rate_limit(text: &str) -> bool {
    let normalized = text.to_lowercase().replace(['_', '-'], " ");
    normalized.contains("rate limit") || normalized.contains("too many requests")
}

impl SendError {
    /// Whether this failure signals the caller exceeded the provider's request rate.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            SendError::Provider {
                status,
                name,
                message,
                ..
            } => {
                *status == 429
                    || name.as_deref().is_some_and(mentions_rate_limit)
                    || mentions_rate_limit(message)
            }
            SendError::Smtp { code, message } => {
                code.is_some_and(|c| TRANSIENT_SMTP_CODES.contains(&c))
                    || mentions_rate_limit(message)
            }
            SendError::Transport(message) => mentions_rate_limit(message),
            SendError::InvalidMessage(_) => false,
            SendError::RetriesExhausted { .. } => true,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SendError::Provider { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Errors that abort a whole request rather than a single recipient.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Rate limited: {0}")]
    RateLimited(String),
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    #[error("Email error: {0}")]
    Send(#[from] SendError),
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
            DispatchError::NotFound(_) => StatusCode::NOT_FOUND,
            DispatchError::Conflict(_) => StatusCode::CONFLICT,
            DispatchError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            DispatchError::Send(e) if e.is_rate_limited() => StatusCode::TOO_MANY_REQUESTS,
            DispatchError::Database(_)
            | DispatchError::Send(_)
            | DispatchError::Template(_)
            | DispatchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(
                name = "api.request_failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %self,
                status = status.as_u16(),
                message = "Request failed"
            );
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
