//! Player-facing endpoints: registration, response links and the weekly roster.

use crate::AppResources;
use crate::entity::{user, weekly_response::ResponseStatus};
use crate::error::DispatchError;
use crate::schedule::{next_session_date, parse_week, today};
use crate::store::responses::{self, ResponseView, Roster};
use crate::store::{NewUser, users};
use axum::{
    Extension, Json,
    extract::{Path, Query},
};
use hyper::StatusCode;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};

/// Tag for OpenAPI documentation.
pub const PLAYERS_TAG: &str = "Players API";

#[derive(Debug, Deserialize, ToSchema)]
struct RespondRequest {
    /// `yes`, `maybe` or `no`
    response: String,
}

#[derive(Debug, Deserialize, IntoParams)]
struct RosterParams {
    /// Session date (`YYYY-MM-DD`). Defaults to the next session.
    week: Option<String>,
}

pub fn router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(register_user))
        .routes(routes!(get_response, submit_response))
        .routes(routes!(roster))
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/api/users",
    operation_id = "Register Player",
    tag = PLAYERS_TAG,
    summary = "Register a new player",
    request_body(content = NewUser, description = "Player details"),
    responses(
        (status = 201, description = "Player created", body = user::Model),
        (status = 400, description = "Missing name or invalid email"),
        (status = 409, description = "Email already registered")
    )
)]
async fn register_user(
    Extension(resources): Extension<AppResources>,
    Json(payload): Json<NewUser>,
) -> Result<(StatusCode, Json<user::Model>), DispatchError> {
    let created = users::create_user(&resources.db, payload).await?;
    tracing::info!(
        name = "api.register_user.created",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        user_id = %created.id,
        message = "Player registered"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/api/respond/{token}",
    operation_id = "Get Response",
    tag = PLAYERS_TAG,
    summary = "Look up the response behind a link",
    params(("token" = String, Path, description = "Response token from the invitation")),
    responses(
        (status = 200, description = "Current answer", body = ResponseView),
        (status = 404, description = "Unknown token")
    )
)]
async fn get_response(
    Extension(resources): Extension<AppResources>,
    Path(token): Path<String>,
) -> Result<Json<ResponseView>, DispatchError> {
    responses::find_by_token(&resources.db, &token)
        .await?
        .map(Json)
        .ok_or_else(|| DispatchError::NotFound("Unknown response link".into()))
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/api/respond/{token}",
    operation_id = "Submit Response",
    tag = PLAYERS_TAG,
    summary = "Answer an invitation",
    params(("token" = String, Path, description = "Response token from the invitation")),
    request_body(content = RespondRequest, description = "The player's answer"),
    responses(
        (status = 200, description = "Answer recorded", body = ResponseView),
        (status = 400, description = "Answer is not yes, maybe or no"),
        (status = 404, description = "Unknown token")
    )
)]
async fn submit_response(
    Extension(resources): Extension<AppResources>,
    Path(token): Path<String>,
    Json(payload): Json<RespondRequest>,
) -> Result<Json<ResponseView>, DispatchError> {
    let status = ResponseStatus::parse_choice(&payload.response).ok_or_else(|| {
        DispatchError::Validation("Response must be one of yes, maybe or no".into())
    })?;
    let recorded = responses::record_response(&resources.db, &token, status).await?;
    Ok(Json(recorded))
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/api/roster",
    operation_id = "Weekly Roster",
    tag = PLAYERS_TAG,
    summary = "Who is playing",
    description = "Every registered player with their answer for the given week. Players who were \
                   never invited that week are listed as `no_response`.",
    params(RosterParams),
    responses(
        (status = 200, description = "Roster for the week", body = Roster),
        (status = 400, description = "Malformed week")
    )
)]
async fn roster(
    Extension(resources): Extension<AppResources>,
    Query(params): Query<RosterParams>,
) -> Result<Json<Roster>, DispatchError> {
    let week = match params.week.as_deref() {
        Some(raw) => parse_week(raw)
            .ok_or_else(|| DispatchError::Validation(format!("Invalid week '{raw}'")))?,
        None => next_session_date(today()),
    };
    Ok(Json(responses::roster(&resources.db, week).await?))
}
