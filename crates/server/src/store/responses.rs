use crate::entity::weekly_response::{self, ResponseStatus};
use crate::entity::user;
use crate::error::DispatchError;
use crate::schedule::format_session_date;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, SqlErr,
};
use serde::Serialize;
use std::collections::HashMap;
use time::{Date, OffsetDateTime};
use utoipa::ToSchema;
use uuid::Uuid;

pub async fn existing_token(
    db: &DatabaseConnection,
    user_id: &str,
    week: Date,
) -> Result<Option<String>, DbErr> {
    Ok(weekly_response::Entity::find()
        .filter(weekly_response::Column::UserId.eq(user_id))
        .filter(weekly_response::Column::WeekDate.eq(week))
        .one(db)
        .await?
        .map(|row| row.response_token))
}

/// Returns the response token for (`user_id`, `week`), creating the row on first use.
///
/// Concurrent callers can both miss the lookup; the loser of the insert race hits the
/// unique (user_id, week_date) constraint and re-reads the winner's row.
#[tracing::instrument(skip(db))]
pub async fn ensure_response_token(
    db: &DatabaseConnection,
    user_id: &str,
    week: Date,
) -> Result<String, DispatchError> {
    if let Some(token) = existing_token(db, user_id, week).await? {
        return Ok(token);
    }

    let now = OffsetDateTime::now_utc();
    let token = Uuid::new_v4().to_string();
    let active = weekly_response::ActiveModel {
        id: ActiveValue::Set(Uuid::new_v4().to_string()),
        user_id: ActiveValue::Set(user_id.to_string()),
        week_date: ActiveValue::Set(week),
        status: ActiveValue::Set(ResponseStatus::NoResponse),
        response_token: ActiveValue::Set(token),
        responded_at: ActiveValue::Set(None),
        created_at: ActiveValue::Set(now),
        updated_at: ActiveValue::Set(now),
    };

    match active.insert(db).await {
        Ok(row) => Ok(row.response_token),
        Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            tracing::info!(
                name = "responses.token.insert_race",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                user_id = %user_id,
                message = "Response row created concurrently, re-reading"
            );
            existing_token(db, user_id, week).await?.ok_or_else(|| {
                DispatchError::Internal(format!(
                    "No response token for user {user_id} after unique violation"
                ))
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// A response row joined with the player it belongs to.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResponseView {
    pub player_name: String,
    pub week_date: String,
    pub week_label: String,
    pub status: ResponseStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub responded_at: Option<OffsetDateTime>,
}

impl ResponseView {
    fn new(row: &weekly_response::Model, user: Option<&user::Model>) -> Self {
        Self {
            player_name: user.map(|u| u.display_name().to_string()).unwrap_or_default(),
            week_date: row.week_date.to_string(),
            week_label: format_session_date(row.week_date),
            status: row.status,
            responded_at: row.responded_at,
        }
    }
}

pub async fn find_by_token(
    db: &DatabaseConnection,
    token: &str,
) -> Result<Option<ResponseView>, DbErr> {
    Ok(weekly_response::Entity::find()
        .filter(weekly_response::Column::ResponseToken.eq(token))
        .find_also_related(user::Entity)
        .one(db)
        .await?
        .map(|(row, user)| ResponseView::new(&row, user.as_ref())))
}

#[tracing::instrument(skip(db, token))]
pub async fn record_response(
    db: &DatabaseConnection,
    token: &str,
    status: ResponseStatus,
) -> Result<ResponseView, DispatchError> {
    let Some((row, user)) = weekly_response::Entity::find()
        .filter(weekly_response::Column::ResponseToken.eq(token))
        .find_also_related(user::Entity)
        .one(db)
        .await?
    else {
        return Err(DispatchError::NotFound("Unknown response link".into()));
    };

    let now = OffsetDateTime::now_utc();
    let mut active: weekly_response::ActiveModel = row.into();
    active.status = ActiveValue::Set(status);
    active.responded_at = ActiveValue::Set(Some(now));
    active.updated_at = ActiveValue::Set(now);
    let updated = active.update(db).await?;
    Ok(ResponseView::new(&updated, user.as_ref()))
}

/// Puts every response of `week` back to `no_response`. Returns the number of rows reset.
#[tracing::instrument(skip(db))]
pub async fn reset_week(db: &DatabaseConnection, week: Date) -> Result<u64, DbErr> {
    let result = weekly_response::Entity::update_many()
        .col_expr(
            weekly_response::Column::Status,
            Expr::value(ResponseStatus::NoResponse),
        )
        .col_expr(
            weekly_response::Column::RespondedAt,
            Expr::value(Option::<OffsetDateTime>::None),
        )
        .col_expr(
            weekly_response::Column::UpdatedAt,
            Expr::value(OffsetDateTime::now_utc()),
        )
        .filter(weekly_response::Column::WeekDate.eq(week))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub user_id: String,
    pub name: String,
    pub status: ResponseStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub responded_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RosterCounts {
    pub yes: usize,
    pub maybe: usize,
    pub no: usize,
    pub no_response: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Roster {
    pub week_date: String,
    pub week_label: String,
    pub counts: RosterCounts,
    pub players: Vec<RosterEntry>,
}

fn status_rank(status: ResponseStatus) -> u8 {
    match status {
        ResponseStatus::Yes => 0,
        ResponseStatus::Maybe => 1,
        ResponseStatus::No => 2,
        ResponseStatus::NoResponse => 3,
    }
}

/// Attendance for `week`. Players without a row for that week count as `no_response`.
pub async fn roster(db: &DatabaseConnection, week: Date) -> Result<Roster, DbErr> {
    let users = super::users::all_users(db).await?;
    let responses: HashMap<String, weekly_response::Model> = weekly_response::Entity::find()
        .filter(weekly_response::Column::WeekDate.eq(week))
        .all(db)
        .await?
        .into_iter()
        .map(|row| (row.user_id.clone(), row))
        .collect();

    let mut counts = RosterCounts::default();
    let mut players: Vec<RosterEntry> = users
        .iter()
        .map(|user| {
            let row = responses.get(&user.id);
            let status = row.map_or(ResponseStatus::NoResponse, |r| r.status);
            match status {
                ResponseStatus::Yes => counts.yes += 1,
                ResponseStatus::Maybe => counts.maybe += 1,
                ResponseStatus::No => counts.no += 1,
                ResponseStatus::NoResponse => counts.no_response += 1,
            }
            RosterEntry {
                user_id: user.id.clone(),
                name: user.display_name().to_string(),
                status,
                responded_at: row.and_then(|r| r.responded_at),
            }
        })
        .collect();
    players.sort_by(|a, b| {
        status_rank(a.status)
            .cmp(&status_rank(b.status))
            .then_with(|| a.name.cmp(&b.name))
    });

    Ok(Roster {
        week_date: week.to_string(),
        week_label: format_session_date(week),
        counts,
        players,
    })
}
