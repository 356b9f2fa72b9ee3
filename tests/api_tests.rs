mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{RecordingTransport, StubCompletion, success};
use gpt_relay_bot::message::{HealthStatus, InboundMessage};
use gpt_relay_bot::routes::{self, create_router};
use gpt_relay_bot::services::reply_dispatcher::{DispatchSettings, ReplyDispatcher};
use tower::util::ServiceExt;

#[tokio::test]
async fn health_endpoint_reports_running() {
    let app = create_router();

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let status: HealthStatus = serde_json::from_slice(&body_bytes).unwrap();
    assert_eq!(status, HealthStatus::running());
    assert_eq!(
        serde_json::from_slice::<serde_json::Value>(&body_bytes).unwrap(),
        serde_json::json!({"status": "running"})
    );
}

#[tokio::test]
async fn other_routes_are_not_served() {
    let app = create_router();

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/chat").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn health_answers_while_message_handling_is_stuck() {
    // A completion that never finishes within the test.
    let completion = Arc::new(StubCompletion::new(|_| {
        (Duration::from_secs(3600), success("never"))
    }));
    let transport = Arc::new(RecordingTransport::default());
    let settings = DispatchSettings {
        completion_timeout: Duration::from_secs(3600),
        ..DispatchSettings::default()
    };
    let dispatcher = ReplyDispatcher::new(completion, transport.clone(), settings);
    let stuck = tokio::spawn(async move {
        dispatcher
            .handle(InboundMessage::new("u", "c", "hello"))
            .await
    });

    let listener = routes::bind(0).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(routes::serve(listener));

    let url = format!("http://127.0.0.1:{port}/");
    let client = reqwest::Client::new();
    for _ in 0..5 {
        let resp = tokio::time::timeout(Duration::from_secs(2), client.get(&url).send())
            .await
            .expect("health check answered promptly")
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let json: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(json["status"], "running");
    }

    assert!(transport.sent().is_empty());
    assert!(!stuck.is_finished());
    stuck.abort();
    server.abort();
}
