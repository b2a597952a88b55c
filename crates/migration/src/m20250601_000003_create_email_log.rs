use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Audit trail of every send attempt, successful or not
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EmailLog::Table)
                    .if_not_exists()
                    .col(pk_auto(EmailLog::Id))
                    .col(string(EmailLog::Email))
                    .col(string_null(EmailLog::UserId))
                    .col(
                        ColumnDef::new(EmailLog::EmailType)
                            .string()
                            .not_null()
                            .comment("weekly_invite, correction, custom or test"),
                    )
                    .col(date_null(EmailLog::WeekDate))
                    .col(
                        ColumnDef::new(EmailLog::Status)
                            .string()
                            .not_null()
                            .comment("sent or failed"),
                    )
                    .col(string_null(EmailLog::ProviderMessageId))
                    .col(text_null(EmailLog::Error))
                    .col(integer(EmailLog::Attempts).default(0))
                    .col(
                        timestamp_with_time_zone(EmailLog::SentAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .index(
                        Index::create()
                            .name("idx_email_log_sent_at")
                            .col(EmailLog::SentAt),
                    )
                    .index(
                        Index::create()
                            .name("idx_email_log_email")
                            .col(EmailLog::Email),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EmailLog::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum EmailLog {
    Table,
    Id,
    Email,
    UserId,
    EmailType,
    WeekDate,
    Status,
    ProviderMessageId,
    Error,
    Attempts,
    SentAt,
}
