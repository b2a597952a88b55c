//! One answer per player and session week. The response token is what the
//! yes/maybe/no links carry, so it must be unique across all weeks.

use sea_orm_migration::prelude::*;

use crate::m20250601_000001_create_users::Users;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WeeklyResponses::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WeeklyResponses::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(WeeklyResponses::UserId).string().not_null())
                    .col(ColumnDef::new(WeeklyResponses::WeekDate).date().not_null())
                    .col(
                        ColumnDef::new(WeeklyResponses::Status)
                            .string_len(16)
                            .not_null()
                            .default("no_response"),
                    )
                    .col(
                        ColumnDef::new(WeeklyResponses::ResponseToken)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(WeeklyResponses::RespondedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(WeeklyResponses::CreatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WeeklyResponses::UpdatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_weekly_responses_user_id")
                            .from(WeeklyResponses::Table, WeeklyResponses::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Token creation relies on this to stay get-or-create under concurrency.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_weekly_responses_user_week")
                    .table(WeeklyResponses::Table)
                    .col(WeeklyResponses::UserId)
                    .col(WeeklyResponses::WeekDate)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_weekly_responses_week_date")
                    .table(WeeklyResponses::Table)
                    .col(WeeklyResponses::WeekDate)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(WeeklyResponses::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum WeeklyResponses {
    Table,
    Id,
    UserId,
    WeekDate,
    Status,
    ResponseToken,
    RespondedAt,
    CreatedAt,
    UpdatedAt,
}
