//! Router tests: requests go through the real middleware stack with a
//! recording transport standing in for SMTP.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use core_config::mail::MailSettings;
use courier_api::{handlers::NotificationAccepted, router, state::AppState};
use domain_mail::{Mailer, RecordingTransport};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt; // For oneshot()

fn app(transport: &RecordingTransport) -> axum::Router {
    let settings = MailSettings::new("Courier", "courier.test");
    router(AppState::new(Mailer::new(settings, Arc::new(transport.clone()))))
}

fn notification(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/notifications")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

// Helper to parse JSON response body
async fn json_body<T: serde::de::DeserializeOwned>(body: Body) -> T {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Post-response delivery runs on a spawned task; give it a moment.
async fn wait_for_submissions(transport: &RecordingTransport, expected: usize) {
    for _ in 0..100 {
        if transport.count().await >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} submissions, got {}", expected, transport.count().await);
}

#[tokio::test]
async fn test_health() {
    let transport = RecordingTransport::new();
    let response = app(&transport)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = json_body(response.into_body()).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_ready_reflects_transport_health() {
    let ready = app(&RecordingTransport::new())
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(ready.status(), StatusCode::OK);

    let unavailable = app(&RecordingTransport::failing("down"))
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_notification_is_sent_after_response() {
    let transport = RecordingTransport::new();
    let response = app(&transport)
        .oneshot(notification(json!({
            "recipient": "ada@example.com",
            "subject": "Hello",
            "html": "<p>Hi <strong>Ada</strong></p>",
            "priority": "high",
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    // Nothing goes out while the response body is still pending.
    assert_eq!(transport.count().await, 0);

    let accepted: NotificationAccepted = json_body(response.into_body()).await;
    assert_eq!(accepted.queued, 1);

    wait_for_submissions(&transport, 1).await;
    let submission = &transport.submissions().await[0];
    assert_eq!(submission.recipient, "ada@example.com");
    assert!(submission.headers.contains("X-Priority: 1 (Highest)"));
}

#[tokio::test]
async fn test_invalid_recipient_is_accepted_but_not_sent() {
    let transport = RecordingTransport::new();
    let response = app(&transport)
        .oneshot(notification(json!({
            "recipient": "a@example.com, b@example.com",
            "subject": "Hello",
            "html": "<p>Hi</p>",
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let _: NotificationAccepted = json_body(response.into_body()).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.count().await, 0);
}

#[tokio::test]
async fn test_missing_subject_is_rejected() {
    let transport = RecordingTransport::new();
    let response = app(&transport)
        .oneshot(notification(json!({
            "recipient": "ada@example.com",
            "subject": " ",
            "html": "<p>Hi</p>",
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_each_request_gets_its_own_queue() {
    let transport = RecordingTransport::new();
    let app = app(&transport);

    for recipient in ["a@example.com", "b@example.com"] {
        let response = app
            .clone()
            .oneshot(notification(json!({
                "recipient": recipient,
                "subject": "Hi",
                "html": "<p>Hi</p>",
            })))
            .await
            .unwrap();
        let accepted: NotificationAccepted = json_body(response.into_body()).await;
        assert_eq!(accepted.queued, 1);
    }

    wait_for_submissions(&transport, 2).await;
    assert!(transport.was_sent_to("a@example.com").await);
    assert!(transport.was_sent_to("b@example.com").await);
}
