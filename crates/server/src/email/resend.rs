//! Client for the Resend transactional email HTTP API.

use crate::email::{EmailProvider, OutgoingEmail, SendReceipt};
use crate::error::SendError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct ResendClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct SendEmailResponse {
    id: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ResendClient {
    pub fn new(base_url: String, api_key: String) -> Result<Self, SendError> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("tiki-taka/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SendError::Transport(e.to_string()))?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

/// Reads a `Retry-After` header given in (possibly fractional) seconds.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?;
    let secs: f64 = raw.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

#[async_trait]
impl EmailProvider for ResendClient {
    #[tracing::instrument(skip_all, fields(to = %email.to))]
    async fn send(&self, email: &OutgoingEmail) -> Result<SendReceipt, SendError> {
        let request = SendEmailRequest {
            from: &email.from,
            to: [&email.to],
            subject: &email.subject,
            html: &email.html,
            text: &email.text,
        };

        let response = self
            .http_client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body: SendEmailResponse = response
                .json()
                .await
                .map_err(|e| SendError::Transport(format!("Invalid response body: {e}")))?;
            return Ok(SendReceipt { id: Some(body.id) });
        }

        let retry_after = parse_retry_after(response.headers());
        let raw = response.text().await.unwrap_or_default();
        let body: ErrorBody = serde_json::from_str(&raw).unwrap_or_default();
        let message = body.message.unwrap_or_else(|| {
            if raw.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            } else {
                raw
            }
        });

        Err(SendError::Provider {
            status: status.as_u16(),
            name: body.name,
            message,
            retry_after,
        })
    }

    fn name(&self) -> &'static str {
        "resend"
    }
}
