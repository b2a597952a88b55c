//! Admin dispatch endpoints (`/api/admin/*`).
//!
//! The bulk endpoints share one [`RateLimiter`] so two admins clicking at once cannot
//! double the send rate. The test endpoint is paced by its [`QueueProcessor`] instead.

use crate::api::auth::AdminAuth;
use crate::dispatch::{
    BatchDispatcher, BatchSettings, DispatchSummary, QueueProcessor, QueueStatus, RateLimitStatus,
    RateLimiter, RetryPolicy, Submission, rate_limiter::now_ms,
};
use crate::entity::email_log;
use crate::error::DispatchError;
use crate::jobs::{CorrectionJobs, CustomJobs, InviteJobs, render_invitation};
use crate::schedule::{current_session_date, next_session_date, today};
use crate::store::audit::{self, EmailStats, TestSendAudit};
use crate::store::{EmailType, log_results, responses, users};
use crate::AppResources;
use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
};
use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use time::OffsetDateTime;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Tag for OpenAPI documentation.
pub const ADMIN_TAG: &str = "Admin API";

/// Shared state for admin endpoints.
#[derive(Clone)]
pub struct AdminState {
    pub limiter: Arc<RateLimiter>,
    pub test_queue: Arc<QueueProcessor>,
}

impl AdminState {
    pub fn new(resources: &AppResources, limiter: Arc<RateLimiter>) -> Self {
        let policy = RetryPolicy::from(&resources.config.test_email.retry);
        Self {
            limiter,
            test_queue: Arc::new(
                QueueProcessor::new(resources.mailer.clone(), policy)
                    .with_observer(Arc::new(TestSendAudit::new(resources.db.clone()))),
            ),
        }
    }
}

/// Creates the admin API router.
#[tracing::instrument(skip_all)]
pub fn router(state: AdminState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(weekly_invites))
        .routes(routes!(correction_email))
        .routes(routes!(custom_email))
        .routes(routes!(test_email))
        .routes(routes!(reset_weekly_responses))
        .routes(routes!(rate_limit_status))
        .routes(routes!(rate_limit_reset))
        .routes(routes!(email_diagnostics))
        .with_state(state)
}

fn dispatcher(resources: &AppResources, settings: BatchSettings) -> BatchDispatcher {
    BatchDispatcher::new(
        resources.mailer.clone(),
        RetryPolicy::from(&resources.config.dispatch.retry),
        settings,
    )
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct CorrectionRequest {
    /// `test_connection` checks reachability without sending anything.
    #[serde(default)]
    action: Option<String>,
    /// Restrict the run to these addresses.
    #[serde(default)]
    emails: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct CustomEmailRequest {
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    include_response_link: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
struct TestEmailRequest {
    #[serde(default)]
    email: Option<String>,
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/weekly-invites",
    operation_id = "Send Weekly Invites",
    tag = ADMIN_TAG,
    summary = "Invite every player to the next session",
    description = "Creates (or reuses) a response token per player for the next Wednesday session and \
                   sends each player an invitation with one-click yes/maybe/no links.\n\n\
                   Sends are batched and paced; rate-limited sends are retried with backoff. \
                   Individual failures do not abort the run and are reported in `results`.",
    responses(
        (status = 200, description = "Run finished", body = DispatchSummary),
        (status = 401, description = "Missing or wrong admin token"),
        (status = 500, description = "Users could not be loaded")
    ),
    security(("Authorization" = []))
)]
async fn weekly_invites(
    _admin: AdminAuth,
    State(state): State<AdminState>,
    Extension(resources): Extension<AppResources>,
) -> Result<Json<DispatchSummary>, DispatchError> {
    let week = next_session_date(today());
    let recipients = users::all_recipients(&resources.db).await?;
    if recipients.is_empty() {
        return Ok(Json(
            DispatchSummary::from_results(Vec::new())
                .with_week(week)
                .with_message("No users found to send invites to"),
        ));
    }

    state.limiter.acquire().await;
    let builder = InviteJobs {
        db: resources.db.clone(),
        config: resources.config.clone(),
        week,
    };
    let summary = dispatcher(&resources, BatchSettings::from(&resources.config.dispatch))
        .dispatch(&recipients, &builder)
        .await
        .with_week(week);
    log_results(&resources.db, EmailType::WeeklyInvite, Some(week), &summary.results).await;

    let message = format!(
        "Weekly invites sent: {} successful, {} failed",
        summary.succeeded, summary.failed
    );
    Ok(Json(summary.with_message(message)))
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/correction-email",
    operation_id = "Send Correction Email",
    tag = ADMIN_TAG,
    summary = "Resend working response links",
    description = "Sends a correction email to every player who already has a response for the next \
                   session, optionally limited to `emails`. Players without a response row are skipped.\n\n\
                   A body of `{\"action\": \"test_connection\"}` only checks that the endpoint is reachable.",
    request_body(content = CorrectionRequest, description = "Optional; may be empty"),
    responses(
        (status = 200, description = "Run finished, or connectivity check answered", body = DispatchSummary),
        (status = 401, description = "Missing or wrong admin token"),
        (status = 500, description = "Recipients could not be loaded")
    ),
    security(("Authorization" = []))
)]
async fn correction_email(
    _admin: AdminAuth,
    State(state): State<AdminState>,
    Extension(resources): Extension<AppResources>,
    body: Bytes,
) -> Result<Response, DispatchError> {
    // An absent or unparsable body means a plain run.
    let request: CorrectionRequest = serde_json::from_slice(&body).unwrap_or_default();
    if request.action.as_deref() == Some("test_connection") {
        return Ok((
            StatusCode::OK,
            Json(json!({ "ok": true, "message": "correction-email reachable" })),
        )
            .into_response());
    }

    let week = next_session_date(today());
    let recipients =
        users::recipients_with_response(&resources.db, week, request.emails.as_deref()).await?;
    if recipients.is_empty() {
        return Ok(Json(
            DispatchSummary::from_results(Vec::new())
                .with_week(week)
                .with_message("No players with a response this week"),
        )
        .into_response());
    }

    state.limiter.acquire().await;
    let builder = CorrectionJobs {
        db: resources.db.clone(),
        config: resources.config.clone(),
        week,
    };
    let settings = BatchSettings::from(&resources.config.dispatch)
        .with_batch_size(resources.config.dispatch.correction_batch_size);
    let summary = dispatcher(&resources, settings)
        .dispatch(&recipients, &builder)
        .await
        .with_week(week);
    log_results(&resources.db, EmailType::Correction, Some(week), &summary.results).await;

    let message = format!(
        "Correction emails sent: {} successful, {} failed",
        summary.succeeded, summary.failed
    );
    Ok(Json(summary.with_message(message)).into_response())
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/custom-email",
    operation_id = "Send Custom Email",
    tag = ADMIN_TAG,
    summary = "Broadcast a custom message to every player",
    request_body(content = CustomEmailRequest, description = "Subject, message and whether to add response links"),
    responses(
        (status = 200, description = "Run finished", body = DispatchSummary),
        (status = 400, description = "Subject or message missing", content_type = "application/json", example = json!({"error": "Subject and message are required"})),
        (status = 401, description = "Missing or wrong admin token"),
        (status = 500, description = "Users could not be loaded")
    ),
    security(("Authorization" = []))
)]
async fn custom_email(
    _admin: AdminAuth,
    State(state): State<AdminState>,
    Extension(resources): Extension<AppResources>,
    Json(payload): Json<CustomEmailRequest>,
) -> Result<Json<DispatchSummary>, DispatchError> {
    let subject = payload.subject.as_deref().map(str::trim).unwrap_or_default();
    let message = payload.message.as_deref().map(str::trim).unwrap_or_default();
    if subject.is_empty() || message.is_empty() {
        return Err(DispatchError::Validation(
            "Subject and message are required".into(),
        ));
    }

    let week = next_session_date(today());
    let recipients = users::all_recipients(&resources.db).await?;
    if recipients.is_empty() {
        return Ok(Json(
            DispatchSummary::from_results(Vec::new()).with_message("No users found"),
        ));
    }

    state.limiter.acquire().await;
    let builder = CustomJobs {
        db: resources.db.clone(),
        config: resources.config.clone(),
        week,
        subject: subject.to_string(),
        message: message.to_string(),
        include_response_link: payload.include_response_link,
    };
    let mut summary = dispatcher(&resources, BatchSettings::from(&resources.config.dispatch))
        .dispatch(&recipients, &builder)
        .await;
    if payload.include_response_link {
        summary = summary.with_week(week);
    }
    log_results(
        &resources.db,
        EmailType::Custom,
        payload.include_response_link.then_some(week),
        &summary.results,
    )
    .await;

    let message = format!(
        "Custom email sent: {} successful, {} failed",
        summary.succeeded, summary.failed
    );
    Ok(Json(summary.with_message(message)))
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/test-email",
    operation_id = "Send Test Email",
    tag = ADMIN_TAG,
    summary = "Send a sample invitation to one address",
    description = "Renders a weekly invitation with a throwaway token and sends it to `email`.\n\n\
                   Only one test send runs at a time. A request arriving while another is in flight \
                   is queued and answered with **202** and its queue position; queued sends are \
                   delivered in order in the background.",
    request_body(content = TestEmailRequest, description = "Recipient address"),
    responses(
        (status = 200, description = "Sent", content_type = "application/json", example = json!({"success": true, "message": "Test email sent successfully to player@example.org", "data": {"id": "re_123"}, "attempts": 1})),
        (status = 202, description = "Queued behind an in-flight send", content_type = "application/json", example = json!({"queued": true, "position": 1})),
        (status = 400, description = "Missing or invalid email"),
        (status = 401, description = "Missing or wrong admin token"),
        (status = 429, description = "Provider still rate limiting after all retries"),
        (status = 500, description = "Provider rejected the message")
    ),
    security(("Authorization" = []))
)]
async fn test_email(
    _admin: AdminAuth,
    State(state): State<AdminState>,
    Extension(resources): Extension<AppResources>,
    Json(payload): Json<TestEmailRequest>,
) -> Result<Response, DispatchError> {
    let to = payload.email.as_deref().map(str::trim).unwrap_or_default();
    if to.is_empty() {
        return Err(DispatchError::Validation("Email address is required".into()));
    }
    if !users::is_valid_email(to) {
        return Err(DispatchError::Validation("Invalid email address".into()));
    }

    let config = &resources.config;
    let token = format!("test-token-{}", now_ms());
    let email = render_invitation(
        config,
        next_session_date(today()),
        &config.test_email.player_name,
        to,
        &token,
    )?;

    let outcome = match state.test_queue.submit(email).await {
        Submission::Queued { position } => {
            return Ok((
                StatusCode::ACCEPTED,
                Json(json!({
                    "queued": true,
                    "position": position,
                    "message": "We are sending test emails as fast as allowed. Your request is queued and will be sent shortly.",
                })),
            )
                .into_response());
        }
        Submission::Completed(outcome) => outcome,
    };

    let response = match outcome {
        Ok(sent) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": format!("Test email sent successfully to {to}"),
                "data": { "id": sent.value.id },
                "attempts": sent.attempts,
            })),
        ),
        Err(e) if e.is_exhausted() => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": "Rate limited",
                "message": "Too many requests to the email provider right now. Please wait a minute and try again.",
                "attempts": e.attempts(),
            })),
        ),
        Err(e) => {
            tracing::error!(
                name = "api.test_email.send_failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %e,
                message = "Test email failed"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    };
    Ok(response.into_response())
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/reset-weekly-responses",
    operation_id = "Reset Weekly Responses",
    tag = ADMIN_TAG,
    summary = "Clear all answers for the current session week",
    description = "Sets every response for the most recent Wednesday (today included) back to `no_response`.",
    responses(
        (status = 200, description = "Responses reset", content_type = "application/json", example = json!({"success": true, "resetCount": 12, "weekDate": "2025-06-04"})),
        (status = 401, description = "Missing or wrong admin token"),
        (status = 500, description = "Database error")
    ),
    security(("Authorization" = []))
)]
async fn reset_weekly_responses(
    _admin: AdminAuth,
    Extension(resources): Extension<AppResources>,
) -> Result<Response, DispatchError> {
    let week = current_session_date(today());
    let reset = responses::reset_week(&resources.db, week).await?;
    tracing::info!(
        name = "api.reset_weekly_responses.done",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        week = %week,
        reset,
        message = "Weekly responses reset"
    );
    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "resetCount": reset,
            "weekDate": week.to_string(),
        })),
    )
        .into_response())
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/rate-limit",
    operation_id = "Rate Limit Status",
    tag = ADMIN_TAG,
    summary = "Time until the next bulk send is allowed",
    responses(
        (status = 200, description = "Current limiter state", body = RateLimitStatus),
        (status = 401, description = "Missing or wrong admin token")
    ),
    security(("Authorization" = []))
)]
async fn rate_limit_status(
    _admin: AdminAuth,
    State(state): State<AdminState>,
) -> Json<RateLimitStatus> {
    Json(state.limiter.status(now_ms()))
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/rate-limit/reset",
    operation_id = "Reset Rate Limit",
    tag = ADMIN_TAG,
    summary = "Clear the bulk send cooldown",
    responses(
        (status = 200, description = "Limiter state after the reset", body = RateLimitStatus),
        (status = 401, description = "Missing or wrong admin token")
    ),
    security(("Authorization" = []))
)]
async fn rate_limit_reset(
    _admin: AdminAuth,
    State(state): State<AdminState>,
) -> Json<RateLimitStatus> {
    state.limiter.reset();
    tracing::info!(
        name = "api.rate_limit.reset",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        message = "Rate limiter reset by admin"
    );
    Json(state.limiter.status(now_ms()))
}

/// Which settings the delivery path depends on are present. Secrets are reported
/// by presence and length only.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct EnvironmentReport {
    provider: &'static str,
    from: String,
    resend_api_key_present: bool,
    resend_api_key_length: usize,
    smtp_configured: bool,
    database_configured: bool,
    admin_token_configured: bool,
    frontend_url: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct EmailDiagnostics {
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    environment: EnvironmentReport,
    email_stats: EmailStats,
    recent_emails: Vec<email_log::Model>,
    test_queue: QueueStatus,
    rate_limit: RateLimitStatus,
}

const RECENT_EMAILS: u64 = 10;

#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/email-diagnostics",
    operation_id = "Email Diagnostics",
    tag = ADMIN_TAG,
    summary = "Delivery configuration and recent send history",
    description = "Reports whether the email transport is configured (secrets by presence only), \
                   totals from the audit log, the ten most recent sends, and the state of the \
                   test-email queue and bulk rate limiter. Use the test-email endpoint for a live \
                   send check.",
    responses(
        (status = 200, description = "Diagnostics snapshot", body = EmailDiagnostics),
        (status = 401, description = "Missing or wrong admin token"),
        (status = 500, description = "Audit log could not be read")
    ),
    security(("Authorization" = []))
)]
async fn email_diagnostics(
    _admin: AdminAuth,
    State(state): State<AdminState>,
    Extension(resources): Extension<AppResources>,
) -> Result<Json<EmailDiagnostics>, DispatchError> {
    let config = &resources.config;
    let api_key = config.email.resend.api_key.trim();
    let environment = EnvironmentReport {
        provider: resources.mailer.name(),
        from: config.email.from.clone(),
        resend_api_key_present: !api_key.is_empty(),
        resend_api_key_length: api_key.len(),
        smtp_configured: config.email.smtp.is_some(),
        database_configured: !config.database_url.trim().is_empty(),
        admin_token_configured: config.admin_token.is_some(),
        frontend_url: config.base_url().to_string(),
    };

    let email_stats = audit::email_stats(&resources.db, today()).await?;
    let recent_emails = audit::recent_emails(&resources.db, RECENT_EMAILS).await?;
    tracing::info!(
        name = "api.email_diagnostics.done",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        total = email_stats.total,
        failed = email_stats.failed,
        message = "Email diagnostics collected"
    );

    Ok(Json(EmailDiagnostics {
        timestamp: OffsetDateTime::now_utc(),
        environment,
        email_stats,
        recent_emails,
        test_queue: state.test_queue.status(),
        rate_limit: state.limiter.status(now_ms()),
    }))
}
