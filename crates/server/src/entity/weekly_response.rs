//! One row per player and session week, carrying the token their response link uses.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use utoipa::ToSchema;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    #[sea_orm(string_value = "yes")]
    Yes,
    #[sea_orm(string_value = "maybe")]
    Maybe,
    #[sea_orm(string_value = "no")]
    No,
    #[sea_orm(string_value = "no_response")]
    NoResponse,
}

impl ResponseStatus {
    /// Statuses a player can pick from a response link.
    pub const CHOICES: [ResponseStatus; 3] =
        [ResponseStatus::Yes, ResponseStatus::Maybe, ResponseStatus::No];

    pub fn as_str(self) -> &'static str {
        match self {
            ResponseStatus::Yes => "yes",
            ResponseStatus::Maybe => "maybe",
            ResponseStatus::No => "no",
            ResponseStatus::NoResponse => "no_response",
        }
    }

    /// Parses a player's choice. `no_response` is not a valid choice.
    pub fn parse_choice(raw: &str) -> Option<Self> {
        Self::CHOICES
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(raw.trim()))
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, ToSchema)]
#[sea_orm(table_name = "weekly_responses")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    pub week_date: Date,
    pub status: ResponseStatus,
    #[sea_orm(unique)]
    pub response_token: String,
    pub responded_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choices_exclude_no_response() {
        assert_eq!(ResponseStatus::parse_choice("yes"), Some(ResponseStatus::Yes));
        assert_eq!(ResponseStatus::parse_choice(" Maybe "), Some(ResponseStatus::Maybe));
        assert_eq!(ResponseStatus::parse_choice("no"), Some(ResponseStatus::No));
        assert_eq!(ResponseStatus::parse_choice("no_response"), None);
        assert_eq!(ResponseStatus::parse_choice("perhaps"), None);
    }
}
