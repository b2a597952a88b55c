mod common;

use serde_json::json;
use std::time::Duration;
use tiki_taka::dispatch::{RetryPolicy, send_email};
use tiki_taka::email::resend::ResendClient;
use tiki_taka::email::{EmailProvider, OutgoingEmail};
use tiki_taka::error::SendError;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn message() -> OutgoingEmail {
    OutgoingEmail {
        from: "Tiki Taka <noreply@example.org>".into(),
        to: "kasper@example.org".into(),
        subject: "Ready for Tiki Taka this Wednesday?".into(),
        html: "<p>Hi Kasper!</p>".into(),
        text: "Hi Kasper!".into(),
    }
}

async fn client(server: &MockServer) -> ResendClient {
    ResendClient::new(server.uri(), "re_test_key".into()).expect("client")
}

#[tokio::test]
async fn successful_send_returns_message_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .and(header("authorization", "Bearer re_test_key"))
        .and(body_partial_json(json!({
            "from": "Tiki Taka <noreply@example.org>",
            "to": ["kasper@example.org"],
            "subject": "Ready for Tiki Taka this Wednesday?"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "re_123"})))
        .expect(1)
        .mount(&server)
        .await;

    let receipt = client(&server).await.send(&message()).await.expect("sent");
    assert_eq!(receipt.id.as_deref(), Some("re_123"));
}

#[tokio::test]
async fn rate_limit_response_is_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "2")
                .set_body_json(json!({
                    "statusCode": 429,
                    "name": "rate_limit_exceeded",
                    "message": "Too many requests. You can only make 2 requests per second."
                })),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .await
        .send(&message())
        .await
        .expect_err("rate limited");
    assert!(err.is_rate_limited());
    assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
    match err {
        SendError::Provider { status, name, .. } => {
            assert_eq!(status, 429);
            assert_eq!(name.as_deref(), Some("rate_limit_exceeded"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn validation_errors_are_not_rate_limits() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "statusCode": 422,
            "name": "validation_error",
            "message": "Invalid `to` field."
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .await
        .send(&message())
        .await
        .expect_err("rejected");
    assert!(!err.is_rate_limited());
    assert!(err.to_string().contains("Invalid `to` field."));
}

#[tokio::test]
async fn send_email_retries_through_rate_limits() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "name": "rate_limit_exceeded",
            "message": "Too many requests"
        })))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "re_after_retry"})))
        .with_priority(2)
        .mount(&server)
        .await;

    let policy = RetryPolicy {
        max_retries: 3,
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
        max_jitter: Duration::ZERO,
    };
    let sent = send_email(&client(&server).await, &message(), &policy)
        .await
        .expect("sent after retries");

    assert_eq!(sent.attempts, 3);
    assert_eq!(sent.value.id.as_deref(), Some("re_after_retry"));
    assert_eq!(server.received_requests().await.map(|r| r.len()), Some(3));
}

#[tokio::test]
async fn unreachable_provider_is_a_transport_error() {
    let client =
        ResendClient::new("http://127.0.0.1:9".into(), "re_test_key".into()).expect("client");
    let err = client.send(&message()).await.expect_err("no server");
    assert!(matches!(err, SendError::Transport(_)));
    assert!(!err.is_rate_limited());
}
