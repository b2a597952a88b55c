mod common;

use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum_test::TestServer;
use common::{
    ScriptedProvider, count_rows, create_test_config, create_test_resources, rate_limited,
    rejected, seed_user,
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tiki_taka::AppResources;
use tiki_taka::api::{AdminState, app};
use tiki_taka::config::AppConfig;
use tiki_taka::dispatch::RateLimiter;
use tiki_taka::entity::weekly_response;
use tiki_taka::schedule::{next_session_date, today};

struct Harness {
    server: TestServer,
    resources: AppResources,
    provider: Arc<ScriptedProvider>,
}

async fn harness_with(config: AppConfig, provider: Arc<ScriptedProvider>) -> Harness {
    let resources = create_test_resources(config, provider.clone()).await;
    let limiter = Arc::new(RateLimiter::from_config(&resources.config.rate_limit));
    let admin_state = AdminState::new(&resources, limiter);
    let server = TestServer::new(app(admin_state, resources.clone())).expect("create test server");
    Harness {
        server,
        resources,
        provider,
    }
}

async fn harness() -> Harness {
    harness_with(create_test_config(), ScriptedProvider::new()).await
}

async fn token_for(resources: &AppResources, user_id: &str) -> String {
    weekly_response::Entity::find()
        .filter(weekly_response::Column::UserId.eq(user_id))
        .one(resources.db.as_ref())
        .await
        .expect("query")
        .expect("response row")
        .response_token
}

#[tokio::test]
async fn health_endpoint_returns_ok() {
    let h = harness().await;
    let response = h.server.get("/healthz").await;
    response.assert_status_ok();
    assert_eq!(response.text(), "ok");
}

#[tokio::test]
async fn wrong_method_is_rejected() {
    let h = harness().await;
    let response = h.server.get("/api/admin/weekly-invites").await;
    response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn cors_preflight_is_answered() {
    let h = harness().await;
    let response = h
        .server
        .method(Method::OPTIONS, "/api/admin/test-email")
        .add_header(
            HeaderName::from_static("origin"),
            HeaderValue::from_static("https://tikitaka.example.org"),
        )
        .add_header(
            HeaderName::from_static("access-control-request-method"),
            HeaderValue::from_static("POST"),
        )
        .await;
    response.assert_status_ok();
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn openapi_docs_are_served() {
    let h = harness().await;
    h.server.get("/api-docs").await.assert_status_ok();
}

#[tokio::test]
async fn custom_email_requires_subject_and_message() {
    let h = harness().await;
    let response = h
        .server
        .post("/api/admin/custom-email")
        .json(&json!({"subject": "  ", "message": "Hello"}))
        .await;
    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "Subject and message are required");
    assert_eq!(h.provider.calls(), 0);
}

#[tokio::test]
async fn custom_email_reaches_every_player() {
    let h = harness().await;
    seed_user(&h.resources.db, "Kasper", "kasper@example.org").await;
    seed_user(&h.resources.db, "Sofie", "sofie@example.org").await;

    let response = h
        .server
        .post("/api/admin/custom-email")
        .json(&json!({
            "subject": "Pitch moved",
            "message": "We play indoors this week.",
            "includeResponseLink": true
        }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["succeeded"], 2);
    assert!(body["weekDate"].is_string());

    let sent = h.provider.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|m| m.subject == "Pitch moved"));
    assert!(sent[0].html.contains("response=yes"));
    assert_eq!(count_rows(&h.resources.db, "weekly_responses").await, 2);
}

#[tokio::test]
async fn test_email_validates_address() {
    let h = harness().await;
    h.server
        .post("/api/admin/test-email")
        .json(&json!({}))
        .await
        .assert_status_bad_request();

    let response = h
        .server
        .post("/api/admin/test-email")
        .json(&json!({"email": "not-an-address"}))
        .await;
    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "Invalid email address");
}

#[tokio::test]
async fn test_email_is_sent_and_logged() {
    let h = harness().await;
    let response = h
        .server
        .post("/api/admin/test-email")
        .json(&json!({"email": "coach@example.org"}))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["attempts"], 1);
    assert_eq!(body["data"]["id"], "msg-1");
    assert_eq!(
        body["message"],
        "Test email sent successfully to coach@example.org"
    );

    let sent = h.provider.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.contains("Hi Test Player!"));
    assert!(sent[0].html.contains("/respond/test-token-"));
    assert_eq!(count_rows(&h.resources.db, "email_log").await, 1);
}

#[tokio::test]
async fn test_email_reports_exhausted_rate_limit() {
    let h = harness_with(create_test_config(), ScriptedProvider::failing(rate_limited())).await;
    let response = h
        .server
        .post("/api/admin/test-email")
        .json(&json!({"email": "coach@example.org"}))
        .await;
    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "Rate limited");
    assert_eq!(body["attempts"], 3);
    assert_eq!(h.provider.calls(), 3);
}

#[tokio::test]
async fn test_email_surfaces_permanent_failures() {
    let h = harness_with(create_test_config(), ScriptedProvider::failing(rejected())).await;
    let response = h
        .server
        .post("/api/admin/test-email")
        .json(&json!({"email": "coach@example.org"}))
        .await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(h.provider.calls(), 1);
}

#[tokio::test]
async fn concurrent_test_email_is_queued() {
    let h = harness_with(
        create_test_config(),
        ScriptedProvider::slow(Duration::from_millis(300)),
    )
    .await;

    let first = async {
        h.server
            .post("/api/admin/test-email")
            .json(&json!({"email": "first@example.org"}))
            .await
    };
    let second = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.server
            .post("/api/admin/test-email")
            .json(&json!({"email": "second@example.org"}))
            .await
    };
    let (first, second) = tokio::join!(first, second);

    first.assert_status_ok();
    second.assert_status(StatusCode::ACCEPTED);
    let body: serde_json::Value = second.json();
    assert_eq!(body["queued"], true);
    assert_eq!(body["position"], 1);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(h.provider.sent().len(), 2);
    assert_eq!(count_rows(&h.resources.db, "email_log").await, 2);
}

#[tokio::test]
async fn weekly_invites_with_no_players() {
    let h = harness().await;
    let response = h.server.post("/api/admin/weekly-invites").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["attempted"], 0);
    assert_eq!(body["message"], "No users found to send invites to");
    assert_eq!(h.provider.calls(), 0);
}

#[tokio::test]
async fn weekly_invites_report_each_player() {
    let provider = ScriptedProvider::with_script(vec![
        common::ok("re_1"),
        Err(rejected()),
    ]);
    let h = harness_with(create_test_config(), provider).await;
    seed_user(&h.resources.db, "Anna", "anna@example.org").await;
    seed_user(&h.resources.db, "Bo", "bo@example.org").await;

    let response = h.server.post("/api/admin/weekly-invites").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();

    let week = next_session_date(today());
    assert_eq!(body["success"], true);
    assert_eq!(body["attempted"], 2);
    assert_eq!(body["succeeded"], 1);
    assert_eq!(body["failed"], 1);
    assert_eq!(body["weekDate"], week.to_string());
    assert_eq!(body["results"][0]["email"], "anna@example.org");
    assert_eq!(body["results"][0]["status"], "sent");
    assert_eq!(body["results"][0]["emailId"], "re_1");
    assert_eq!(body["results"][1]["status"], "failed");
    assert!(body["results"][1]["error"].is_string());
    assert!(body["results"][0].get("userId").is_none());

    assert_eq!(count_rows(&h.resources.db, "email_log").await, 2);
    assert_eq!(count_rows(&h.resources.db, "weekly_responses").await, 2);
}

#[tokio::test]
async fn correction_connectivity_check_sends_nothing() {
    let h = harness().await;
    let response = h
        .server
        .post("/api/admin/correction-email")
        .json(&json!({"action": "test_connection"}))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["ok"], true);
    assert_eq!(h.provider.calls(), 0);
}

#[tokio::test]
async fn correction_targets_only_invited_players() {
    let h = harness().await;
    seed_user(&h.resources.db, "Anna", "anna@example.org").await;
    h.server.post("/api/admin/weekly-invites").await.assert_status_ok();
    seed_user(&h.resources.db, "Late", "late@example.org").await;

    // Empty body is a plain run.
    let response = h.server.post("/api/admin/correction-email").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["attempted"], 1);
    assert_eq!(body["results"][0]["email"], "anna@example.org");

    let sent = h.provider.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].subject, "Quick fix: your response links now work");
    // Same token as the first invitation.
    let yes_link = |html: &str| {
        html.split("response=yes")
            .next()
            .and_then(|head| head.rsplit("/respond/").next())
            .map(str::to_string)
    };
    assert_eq!(yes_link(&sent[0].html), yes_link(&sent[1].html));
}

#[tokio::test]
async fn player_registration() {
    let h = harness().await;
    let response = h
        .server
        .post("/api/users")
        .json(&json!({"name": " Kasper ", "email": "Kasper@Example.org", "nickname": "Kas"}))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["name"], "Kasper");
    assert_eq!(body["email"], "kasper@example.org");

    h.server
        .post("/api/users")
        .json(&json!({"name": "Other", "email": "kasper@example.org"}))
        .await
        .assert_status(StatusCode::CONFLICT);

    h.server
        .post("/api/users")
        .json(&json!({"name": "", "email": "x@example.org"}))
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn respond_flow_updates_roster() {
    let h = harness().await;
    let anna = seed_user(&h.resources.db, "Anna", "anna@example.org").await;
    seed_user(&h.resources.db, "Bo", "bo@example.org").await;
    h.server.post("/api/admin/weekly-invites").await.assert_status_ok();
    let token = token_for(&h.resources, &anna).await;

    let view = h.server.get(&format!("/api/respond/{token}")).await;
    view.assert_status_ok();
    let body: serde_json::Value = view.json();
    assert_eq!(body["playerName"], "Anna");
    assert_eq!(body["status"], "no_response");

    h.server
        .post(&format!("/api/respond/{token}"))
        .json(&json!({"response": "perhaps"}))
        .await
        .assert_status_bad_request();

    let answered = h
        .server
        .post(&format!("/api/respond/{token}"))
        .json(&json!({"response": "yes"}))
        .await;
    answered.assert_status_ok();
    let body: serde_json::Value = answered.json();
    assert_eq!(body["status"], "yes");
    assert!(body["respondedAt"].is_string());

    let week = next_session_date(today());
    let roster = h.server.get(&format!("/api/roster?week={week}")).await;
    roster.assert_status_ok();
    let body: serde_json::Value = roster.json();
    assert_eq!(body["counts"]["yes"], 1);
    assert_eq!(body["counts"]["noResponse"], 1);
    assert_eq!(body["players"][0]["name"], "Anna");
    assert_eq!(body["players"][1]["status"], "no_response");

    h.server
        .get("/api/roster?week=next-tuesday")
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn unknown_token_is_not_found() {
    let h = harness().await;
    h.server
        .get("/api/respond/does-not-exist")
        .await
        .assert_status_not_found();
    h.server
        .post("/api/respond/does-not-exist")
        .json(&json!({"response": "no"}))
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn admin_token_is_enforced_when_configured() {
    let mut config = create_test_config();
    config.admin_token = Some("s3cret".into());
    let h = harness_with(config, ScriptedProvider::new()).await;

    let response = h.server.get("/api/admin/rate-limit").await;
    response.assert_status_unauthorized();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_token");

    h.server
        .get("/api/admin/rate-limit")
        .authorization_bearer("wrong")
        .await
        .assert_status_unauthorized();

    h.server
        .get("/api/admin/rate-limit")
        .authorization_bearer("s3cret")
        .await
        .assert_status_ok();

    // Player endpoints stay public.
    h.server.get("/api/roster").await.assert_status_ok();
}

#[tokio::test]
async fn rate_limit_status_and_reset() {
    let mut config = create_test_config();
    config.rate_limit.min_interval_ms = 60_000;
    let h = harness_with(config, ScriptedProvider::new()).await;
    seed_user(&h.resources.db, "Anna", "anna@example.org").await;

    let idle: serde_json::Value = h.server.get("/api/admin/rate-limit").await.json();
    assert_eq!(idle["ready"], true);
    assert_eq!(idle["waitMs"], 0);

    h.server.post("/api/admin/weekly-invites").await.assert_status_ok();
    let cooling: serde_json::Value = h.server.get("/api/admin/rate-limit").await.json();
    assert_eq!(cooling["ready"], false);
    assert!(cooling["waitMs"].as_u64().unwrap_or_default() > 0);

    let reset = h.server.post("/api/admin/rate-limit/reset").await;
    reset.assert_status_ok();
    let body: serde_json::Value = reset.json();
    assert_eq!(body["ready"], true);
}

#[tokio::test]
async fn reset_weekly_responses_reports_week() {
    let h = harness().await;
    let response = h.server.post("/api/admin/reset-weekly-responses").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["resetCount"], 0);
    assert!(body["weekDate"].is_string());
}

#[tokio::test]
async fn email_diagnostics_report_config_and_history() {
    let h = harness().await;
    h.server
        .post("/api/admin/test-email")
        .json(&json!({"email": "coach@example.org"}))
        .await
        .assert_status_ok();

    let response = h.server.get("/api/admin/email-diagnostics").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();

    let env = &body["environment"];
    assert_eq!(env["provider"], "scripted");
    assert_eq!(env["resendApiKeyPresent"], true);
    assert_eq!(env["resendApiKeyLength"], 7);
    assert_eq!(env["smtpConfigured"], false);
    assert_eq!(env["databaseConfigured"], true);
    assert_eq!(env["adminTokenConfigured"], false);
    assert!(env.get("resendApiKey").is_none());

    assert_eq!(
        body["emailStats"],
        json!({"total": 1, "sent": 1, "failed": 0, "today": 1})
    );
    let recent = body["recentEmails"].as_array().expect("recent emails");
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0]["email"], "coach@example.org");
    assert_eq!(recent[0]["emailType"], "test");
    assert_eq!(body["testQueue"]["processing"], false);
}

#[tokio::test]
async fn email_diagnostics_require_admin_token() {
    let mut config = create_test_config();
    config.admin_token = Some("s3cret".into());
    let h = harness_with(config, ScriptedProvider::new()).await;

    h.server
        .get("/api/admin/email-diagnostics")
        .await
        .assert_status_unauthorized();

    let response = h
        .server
        .get("/api/admin/email-diagnostics")
        .authorization_bearer("s3cret")
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["environment"]["adminTokenConfigured"], true);
    assert_eq!(body["emailStats"]["total"], 0);
}
