//! Writes terminal dispatch results to `email_log`. Failures here never fail a run.

use crate::dispatch::{DispatchResult, SendObserver, SendOutcome};
use crate::email::OutgoingEmail;
use crate::entity::email_log;
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::Serialize;
use std::sync::Arc;
use time::{Date, OffsetDateTime};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailType {
    WeeklyInvite,
    Correction,
    Custom,
    Test,
}

impl EmailType {
    pub fn as_str(self) -> &'static str {
        match self {
            EmailType::WeeklyInvite => "weekly_invite",
            EmailType::Correction => "correction",
            EmailType::Custom => "custom",
            EmailType::Test => "test",
        }
    }
}

struct LogEntry<'a> {
    email: &'a str,
    user_id: Option<&'a str>,
    sent: bool,
    provider_message_id: Option<&'a str>,
    error: Option<&'a str>,
    attempts: u32,
}

async fn insert(
    db: &DatabaseConnection,
    email_type: EmailType,
    week: Option<Date>,
    entry: LogEntry<'_>,
) {
    let active = email_log::ActiveModel {
        id: ActiveValue::NotSet,
        email: ActiveValue::Set(entry.email.to_string()),
        user_id: ActiveValue::Set(entry.user_id.map(str::to_string)),
        email_type: ActiveValue::Set(email_type.as_str().to_string()),
        week_date: ActiveValue::Set(week),
        status: ActiveValue::Set(if entry.sent { "sent" } else { "failed" }.to_string()),
        provider_message_id: ActiveValue::Set(entry.provider_message_id.map(str::to_string)),
        error: ActiveValue::Set(entry.error.map(str::to_string)),
        attempts: ActiveValue::Set(entry.attempts as i32),
        sent_at: ActiveValue::Set(OffsetDateTime::now_utc()),
    };
    if let Err(e) = active.insert(db).await {
        tracing::warn!(
            name = "audit.email_log.insert_failed",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            email_type = email_type.as_str(),
            error = %e,
            message = "Failed to write email audit log"
        );
    }
}

pub async fn log_results(
    db: &DatabaseConnection,
    email_type: EmailType,
    week: Option<Date>,
    results: &[DispatchResult],
) {
    for result in results {
        insert(
            db,
            email_type,
            week,
            LogEntry {
                email: &result.email,
                user_id: Some(result.user_id.as_str()).filter(|id| !id.is_empty()),
                sent: result.is_sent(),
                provider_message_id: result.email_id.as_deref(),
                error: result.error.as_deref(),
                attempts: result.attempts,
            },
        )
        .await;
    }
}

/// Records the outcome of a single test send.
async fn log_test_send(
    db: &DatabaseConnection,
    email: &str,
    outcome: &SendOutcome,
) {
    let error = outcome.as_ref().err().map(ToString::to_string);
    let entry = match outcome {
        Ok(sent) => LogEntry {
            email,
            user_id: None,
            sent: true,
            provider_message_id: sent.value.id.as_deref(),
            error: None,
            attempts: sent.attempts,
        },
        Err(e) => LogEntry {
            email,
            user_id: None,
            sent: false,
            provider_message_id: None,
            error: error.as_deref(),
            attempts: e.attempts(),
        },
    };
    insert(db, EmailType::Test, None, entry).await;
}

/// Logs every test send the queue completes, immediate or drained.
pub struct TestSendAudit {
    db: Arc<DatabaseConnection>,
}

impl TestSendAudit {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SendObserver for TestSendAudit {
    async fn completed(&self, email: &OutgoingEmail, outcome: &SendOutcome) {
        log_test_send(&self.db, &email.to, outcome).await;
    }
}

/// Totals over the whole audit log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmailStats {
    pub total: u64,
    pub sent: u64,
    pub failed: u64,
    /// Rows logged since midnight UTC.
    pub today: u64,
}

pub async fn email_stats(db: &DatabaseConnection, today: Date) -> Result<EmailStats, DbErr> {
    let total = email_log::Entity::find().count(db).await?;
    let sent = email_log::Entity::find()
        .filter(email_log::Column::Status.eq("sent"))
        .count(db)
        .await?;
    let today = email_log::Entity::find()
        .filter(email_log::Column::SentAt.gte(today.midnight().assume_utc()))
        .count(db)
        .await?;
    Ok(EmailStats {
        total,
        sent,
        failed: total.saturating_sub(sent),
        today,
    })
}

/// Newest rows first.
pub async fn recent_emails(
    db: &DatabaseConnection,
    limit: u64,
) -> Result<Vec<email_log::Model>, DbErr> {
    email_log::Entity::find()
        .order_by_desc(email_log::Column::SentAt)
        .order_by_desc(email_log::Column::Id)
        .limit(limit)
        .all(db)
        .await
}
