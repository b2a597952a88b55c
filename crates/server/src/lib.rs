//! Weekly attendance service for a five-a-side team.
//!
//! Players are invited by email every week and answer through one-click links. The
//! admin side sends invitations, corrections and broadcasts through a paced,
//! rate-limit aware dispatch pipeline (see [`dispatch`]).

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::email::EmailProvider;

pub mod api;
pub mod config;
pub mod dispatch;
pub mod email;
pub mod email_templates;
pub mod entity;
pub mod error;
pub mod jobs;
pub mod schedule;
pub mod store;

#[derive(Clone)]
pub struct AppResources {
    pub db: Arc<DatabaseConnection>,
    pub mailer: Arc<dyn EmailProvider>,
    pub config: Arc<AppConfig>,
}
