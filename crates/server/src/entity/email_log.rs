//! Audit trail of every terminal dispatch result.

use sea_orm::entity::prelude::*;
use serde::Serialize;
use time::{Date, OffsetDateTime};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, ToSchema)]
#[sea_orm(table_name = "email_log")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub email: String,
    pub user_id: Option<String>,
    pub email_type: String, // "weekly_invite", "correction", "custom" or "test"
    pub week_date: Option<Date>,
    pub status: String, // "sent" or "failed"
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
    pub attempts: i32,
    pub sent_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
