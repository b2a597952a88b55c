use crate::dispatch::Recipient;
use crate::entity::{user, weekly_response};
use crate::error::DispatchError;
use lettre::Address;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, SqlErr,
};
use serde::Deserialize;
use time::{Date, OffsetDateTime};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl From<&user::Model> for Recipient {
    fn from(user: &user::Model) -> Self {
        Recipient {
            id: user.id.clone(),
            email: user.email.clone(),
            display_name: user.display_name().to_string(),
        }
    }
}

pub fn is_valid_email(raw: &str) -> bool {
    raw.parse::<Address>().is_ok()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Registers a player. Emails are stored lowercased and must be unique.
#[tracing::instrument(skip_all)]
pub async fn create_user(
    db: &DatabaseConnection,
    new_user: NewUser,
) -> Result<user::Model, DispatchError> {
    let name = new_user.name.trim().to_string();
    let email = new_user.email.trim().to_lowercase();
    if name.is_empty() {
        return Err(DispatchError::Validation("Name is required".into()));
    }
    if !is_valid_email(&email) {
        return Err(DispatchError::Validation("Invalid email address".into()));
    }
    if find_by_email(db, &email).await?.is_some() {
        return Err(DispatchError::Conflict("A player with this email already exists".into()));
    }

    let now = OffsetDateTime::now_utc();
    let active = user::ActiveModel {
        id: ActiveValue::Set(Uuid::new_v4().to_string()),
        name: ActiveValue::Set(name),
        email: ActiveValue::Set(email),
        nickname: ActiveValue::Set(non_blank(new_user.nickname)),
        phone: ActiveValue::Set(non_blank(new_user.phone)),
        created_at: ActiveValue::Set(now),
        updated_at: ActiveValue::Set(now),
    };
    match active.insert(db).await {
        Ok(model) => Ok(model),
        // Lost a race against a concurrent registration
        Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => Err(
            DispatchError::Conflict("A player with this email already exists".into()),
        ),
        Err(e) => Err(e.into()),
    }
}

pub async fn find_by_email(
    db: &DatabaseConnection,
    email: &str,
) -> Result<Option<user::Model>, DbErr> {
    user::Entity::find()
        .filter(user::Column::Email.eq(email.trim().to_lowercase()))
        .one(db)
        .await
}

pub async fn all_users(db: &DatabaseConnection) -> Result<Vec<user::Model>, DbErr> {
    user::Entity::find()
        .order_by_asc(user::Column::Name)
        .all(db)
        .await
}

pub async fn all_recipients(db: &DatabaseConnection) -> Result<Vec<Recipient>, DbErr> {
    Ok(all_users(db).await?.iter().map(Recipient::from).collect())
}

/// Players who already hold a response row for `week`, optionally narrowed to `emails`.
pub async fn recipients_with_response(
    db: &DatabaseConnection,
    week: Date,
    emails: Option<&[String]>,
) -> Result<Vec<Recipient>, DbErr> {
    let wanted: Option<Vec<String>> =
        emails.map(|list| list.iter().map(|e| e.trim().to_lowercase()).collect());

    let rows = weekly_response::Entity::find()
        .filter(weekly_response::Column::WeekDate.eq(week))
        .find_also_related(user::Entity)
        .all(db)
        .await?;

    let mut recipients: Vec<Recipient> = rows
        .iter()
        .filter_map(|(_, user)| user.as_ref())
        .filter(|user| {
            wanted
                .as_ref()
                .is_none_or(|list| list.iter().any(|e| *e == user.email))
        })
        .map(Recipient::from)
        .collect();
    recipients.sort_by(|a, b| a.display_name.cmp(&b.display_name));
    Ok(recipients)
}
