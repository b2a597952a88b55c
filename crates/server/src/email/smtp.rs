//! SMTP relay transport, mostly for local development.

use crate::config::SmtpConfig;
use crate::email::{EmailProvider, OutgoingEmail, SendReceipt};
use crate::error::SendError;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, SendError> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.server)
            .map_err(smtp_error)?
            .port(config.port)
            .credentials(creds)
            .build();
        Ok(Self { transport })
    }

    /// Wraps an already configured transport, e.g. `builder_dangerous` in tests.
    pub fn from_transport(transport: AsyncSmtpTransport<Tokio1Executor>) -> Self {
        Self { transport }
    }
}

fn smtp_error(e: lettre::transport::smtp::Error) -> SendError {
    SendError::Smtp {
        code: e.status().and_then(|c| c.to_string().parse().ok()),
        message: e.to_string(),
    }
}

fn parse_mailbox(raw: &str) -> Result<Mailbox, SendError> {
    raw.parse()
        .map_err(|e| SendError::InvalidMessage(format!("Invalid address '{raw}': {e}")))
}

/// Builds the multipart/alternative message lettre sends.
pub fn build_message(email: &OutgoingEmail) -> Result<Message, SendError> {
    Message::builder()
        .from(parse_mailbox(&email.from)?)
        .to(parse_mailbox(&email.to)?)
        .subject(email.subject.clone())
        .header(lettre::message::header::MIME_VERSION_1_0)
        .message_id(None)
        .multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(email.text.clone()),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_HTML)
                        .body(email.html.clone()),
                ),
        )
        .map_err(|e| SendError::InvalidMessage(e.to_string()))
}

#[async_trait]
impl EmailProvider for SmtpMailer {
    #[tracing::instrument(skip_all, fields(to = %email.to))]
    async fn send(&self, email: &OutgoingEmail) -> Result<SendReceipt, SendError> {
        let message = build_message(email)?;
        let response = self.transport.send(message).await.map_err(smtp_error)?;
        // The relay's final reply usually carries its queue id.
        let id = response.message().next().map(str::to_string);
        Ok(SendReceipt { id })
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}
