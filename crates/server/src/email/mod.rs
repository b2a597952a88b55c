//! Outbound email transports.
//!
//! Every send in the service goes through [`EmailProvider`]. Two transports exist:
//! the Resend HTTP API (production) and a plain SMTP relay (local development,
//! e.g. against Mailpit).

use crate::config::{EmailConfig, EmailProviderKind};
use crate::error::SendError;
use async_trait::async_trait;
use std::sync::Arc;

pub mod resend;
pub mod smtp;

pub use resend::ResendClient;
pub use smtp::SmtpMailer;

/// A fully rendered message for a single recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// What the provider hands back for an accepted message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReceipt {
    /// Provider message id, when the transport reports one.
    pub id: Option<String>,
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Hands one message to the provider. Exactly one network call per invocation.
    async fn send(&self, email: &OutgoingEmail) -> Result<SendReceipt, SendError>;

    /// Short transport name for logs.
    fn name(&self) -> &'static str;
}

/// Builds the transport selected in the configuration.
pub fn build_provider(config: &EmailConfig) -> Result<Arc<dyn EmailProvider>, SendError> {
    match config.provider {
        EmailProviderKind::Resend => Ok(Arc::new(ResendClient::new(
            config.resend.base_url.clone(),
            config.resend.api_key.clone(),
        )?)),
        EmailProviderKind::Smtp => {
            let smtp = config.smtp.as_ref().ok_or_else(|| {
                SendError::InvalidMessage("SMTP transport selected without smtp settings".into())
            })?;
            Ok(Arc::new(SmtpMailer::new(smtp)?))
        }
    }
}
