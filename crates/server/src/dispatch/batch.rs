//! Sends one message per recipient in fixed-size batches, paced to stay under the
//! provider's request rate.

use crate::config::DispatchConfig;
use crate::dispatch::retry::{RetryPolicy, send_email};
use crate::email::{EmailProvider, OutgoingEmail};
use crate::error::DispatchError;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use time::Date;
use utoipa::ToSchema;

/// A user about to receive a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub id: String,
    pub email: String,
    /// Nickname when set, otherwise the full name.
    pub display_name: String,
}

/// A rendered message bound to its recipient.
#[derive(Debug, Clone)]
pub struct SendJob {
    pub recipient: Recipient,
    pub email: OutgoingEmail,
    /// Response token the message links to, if any.
    pub response_token: Option<String>,
}

/// Produces the message for one recipient. Failures become per-recipient results.
#[async_trait]
pub trait JobBuilder: Send + Sync {
    async fn build(&self, recipient: &Recipient) -> Result<SendJob, DispatchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    #[serde(skip)]
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub status: DeliveryStatus,
    /// Provider message id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
}

impl DispatchResult {
    pub fn is_sent(&self) -> bool {
        self.status == DeliveryStatus::Sent
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSummary {
    pub success: bool,
    pub message: String,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Session date in ISO form (`2025-06-04`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week_date: Option<String>,
    /// Session date as shown to players (`Wednesday, June 4, 2025`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week_label: Option<String>,
    pub results: Vec<DispatchResult>,
}

impl DispatchSummary {
    pub fn from_results(results: Vec<DispatchResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.is_sent()).count();
        let failed = results.len() - succeeded;
        Self {
            success: true,
            message: format!("{succeeded} sent, {failed} failed"),
            attempted: results.len(),
            succeeded,
            failed,
            week_date: None,
            week_label: None,
            results,
        }
    }

    pub fn with_week(mut self, date: Date) -> Self {
        self.week_date = Some(date.to_string());
        self.week_label = Some(crate::schedule::format_session_date(date));
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    pub batch_size: usize,
    pub inter_send_delay: Duration,
    pub batch_pause: Duration,
}

impl From<&DispatchConfig> for BatchSettings {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            inter_send_delay: Duration::from_millis(config.inter_send_delay_ms),
            batch_pause: Duration::from_millis(config.batch_pause_ms),
        }
    }
}

impl BatchSettings {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

#[derive(Clone)]
pub struct BatchDispatcher {
    provider: Arc<dyn EmailProvider>,
    policy: RetryPolicy,
    settings: BatchSettings,
}

impl BatchDispatcher {
    pub fn new(
        provider: Arc<dyn EmailProvider>,
        policy: RetryPolicy,
        settings: BatchSettings,
    ) -> Self {
        Self {
            provider,
            policy,
            settings,
        }
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    /// Sends to every recipient in order and returns one result per recipient.
    ///
    /// Runs are strictly sequential: a send, including its retries, finishes before
    /// the next recipient is touched.
    #[tracing::instrument(skip_all, fields(recipients = recipients.len(), batch_size = self.settings.batch_size))]
    pub async fn dispatch(
        &self,
        recipients: &[Recipient],
        builder: &dyn JobBuilder,
    ) -> DispatchSummary {
        let total = recipients.len();
        let batch_count = total.div_ceil(self.settings.batch_size);
        let mut results = Vec::with_capacity(total);
        let mut sent_so_far = 0usize;

        for (index, batch) in recipients.chunks(self.settings.batch_size).enumerate() {
            tracing::info!(
                name = "dispatch.batch.start",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                batch = index + 1,
                batches = batch_count,
                size = batch.len(),
                message = "Processing batch"
            );

            for recipient in batch {
                results.push(self.deliver(recipient, builder).await);
                sent_so_far += 1;
                if sent_so_far < total {
                    tokio::time::sleep(self.settings.inter_send_delay).await;
                }
            }

            if index + 1 < batch_count {
                tokio::time::sleep(self.settings.batch_pause).await;
            }
        }

        let summary = DispatchSummary::from_results(results);
        tracing::info!(
            name = "dispatch.batch.completed",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            message = "Dispatch run completed"
        );
        summary
    }

    async fn deliver(&self, recipient: &Recipient, builder: &dyn JobBuilder) -> DispatchResult {
        let failed = |error: String, attempts: u32| DispatchResult {
            user_id: recipient.id.clone(),
            email: recipient.email.clone(),
            name: recipient.display_name.clone(),
            status: DeliveryStatus::Failed,
            email_id: None,
            error: Some(error),
            attempts,
        };

        let job = match builder.build(recipient).await {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(
                    name = "dispatch.job.build_failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    email = %recipient.email,
                    error = %e,
                    message = "Could not prepare message"
                );
                return failed(e.to_string(), 0);
            }
        };

        match send_email(self.provider.as_ref(), &job.email, &self.policy).await {
            Ok(sent) => DispatchResult {
                user_id: recipient.id.clone(),
                email: recipient.email.clone(),
                name: recipient.display_name.clone(),
                status: DeliveryStatus::Sent,
                email_id: sent.value.id,
                error: None,
                attempts: sent.attempts,
            },
            Err(e) => {
                tracing::error!(
                    name = "dispatch.job.send_failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    email = %recipient.email,
                    attempts = e.attempts(),
                    exhausted = e.is_exhausted(),
                    error = %e,
                    message = "Send failed"
                );
                failed(e.to_string(), e.attempts())
            }
        }
    }
}
