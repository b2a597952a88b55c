//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tiki_taka::AppResources;
use tiki_taka::config::{AppConfig, EmailConfig, ResendConfig, RetryConfig};
use tiki_taka::email::{EmailProvider, OutgoingEmail, SendReceipt};
use tiki_taka::error::SendError;
use tiki_taka::store::{NewUser, users};

/// Create an in-memory database with the application schema.
pub async fn create_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.expect("connect");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            nickname TEXT NULL,
            phone TEXT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );"#,
    ))
    .await
    .expect("create users table");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE weekly_responses (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            week_date TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'no_response',
            response_token TEXT NOT NULL UNIQUE,
            responded_at TEXT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (user_id, week_date)
        );"#,
    ))
    .await
    .expect("create weekly_responses table");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE email_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL,
            user_id TEXT NULL,
            email_type TEXT NOT NULL,
            week_date TEXT NULL,
            status TEXT NOT NULL,
            provider_message_id TEXT NULL,
            error TEXT NULL,
            attempts INTEGER NOT NULL,
            sent_at TEXT NOT NULL
        );"#,
    ))
    .await
    .expect("create email_log table");

    db
}

/// Registers a player through the store and returns its id.
pub async fn seed_user(db: &DatabaseConnection, name: &str, email: &str) -> String {
    users::create_user(
        db,
        NewUser {
            name: name.into(),
            email: email.into(),
            nickname: None,
            phone: None,
        },
    )
    .await
    .expect("insert user")
    .id
}

pub async fn count_rows(db: &DatabaseConnection, table: &str) -> i64 {
    let row = db
        .query_one(Statement::from_string(
            DbBackend::Sqlite,
            format!("SELECT COUNT(*) AS n FROM {table};"),
        ))
        .await
        .expect("count query")
        .expect("count row");
    row.try_get("", "n").expect("count value")
}

/// Retry policy without real waiting.
pub fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        max_jitter_ms: 0,
    }
}

/// Create a test config with zero pacing so handler tests run instantly.
pub fn create_test_config() -> AppConfig {
    let mut config = AppConfig {
        database_url: "sqlite::memory:".into(),
        frontend_url: "https://tikitaka.example.org".into(),
        listen_addr: "127.0.0.1:0".into(),
        admin_token: None,
        email: EmailConfig {
            provider: Default::default(),
            from: "Tiki Taka <noreply@example.org>".into(),
            resend: ResendConfig {
                api_key: "re_test".into(),
                base_url: "http://localhost:1".into(),
            },
            smtp: None,
        },
        dispatch: Default::default(),
        test_email: Default::default(),
        rate_limit: Default::default(),
        session: Default::default(),
    };
    config.dispatch.inter_send_delay_ms = 0;
    config.dispatch.batch_pause_ms = 0;
    config.dispatch.retry = fast_retry(2);
    config.test_email.retry = fast_retry(2);
    config.rate_limit.min_interval_ms = 0;
    config
}

pub fn rate_limited() -> SendError {
    SendError::Provider {
        status: 429,
        name: Some("rate_limit_exceeded".into()),
        message: "Too many requests".into(),
        retry_after: None,
    }
}

pub fn rejected() -> SendError {
    SendError::Provider {
        status: 422,
        name: Some("validation_error".into()),
        message: "Invalid `to` field".into(),
        retry_after: None,
    }
}

/// Provider that replays scripted outcomes, then succeeds.
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<SendReceipt, SendError>>>,
    fail_always: Mutex<Option<SendError>>,
    sent: Mutex<Vec<OutgoingEmail>>,
    calls: Mutex<u32>,
    latency: Duration,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_script(outcomes: Vec<Result<SendReceipt, SendError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(outcomes.into()),
            ..Self::default()
        })
    }

    pub fn failing(error: SendError) -> Arc<Self> {
        Arc::new(Self {
            fail_always: Mutex::new(Some(error)),
            ..Self::default()
        })
    }

    pub fn slow(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }
}

pub fn ok(id: &str) -> Result<SendReceipt, SendError> {
    Ok(SendReceipt {
        id: Some(id.to_string()),
    })
}

#[async_trait]
impl EmailProvider for ScriptedProvider {
    async fn send(&self, email: &OutgoingEmail) -> Result<SendReceipt, SendError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(error) = self.fail_always.lock().unwrap().clone() {
            return Err(error);
        }
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ok(&format!("msg-{call}")));
        if outcome.is_ok() {
            self.sent.lock().unwrap().push(email.clone());
        }
        outcome
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

pub async fn create_test_resources(
    config: AppConfig,
    provider: Arc<ScriptedProvider>,
) -> AppResources {
    AppResources {
        db: Arc::new(create_test_db().await),
        mailer: provider,
        config: Arc::new(config),
    }
}
