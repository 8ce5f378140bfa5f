//! Publisher gateway HTTP tests
//!
//! Drives the axum router in-process against the in-memory broker.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use bytes::Bytes;
use http_body_util::BodyExt;
use nats_relay::broker::{Broker, MemoryBroker};
use nats_relay::config::PublisherConfig;
use nats_relay::health::ReadyResponse;
use nats_relay::metrics::RelayMetrics;
use nats_relay::publisher::{router, AppState, ErrorResponse, MessageResponse};
use nats_relay::subscriber::{Relay, BUFFER_CAPACITY};
use std::sync::Arc;
use tower::ServiceExt;

fn app(broker: Arc<MemoryBroker>) -> Router {
    let config = PublisherConfig {
        default_subject: "foo".to_string(),
        reply_subject: "bar".to_string(),
        ..Default::default()
    };
    router(AppState::new(config, broker, RelayMetrics::detached()))
}

async fn post(app: Router, uri: &str) -> (StatusCode, Bytes) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Bytes) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

#[tokio::test]
async fn publish_uses_default_subject() {
    let broker = Arc::new(MemoryBroker::new());

    let (status, body) = post(app(broker.clone()), "/publish?message=hi").await;

    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json, serde_json::json!({"message": "Message published"}));

    let published = broker.published_to("foo");
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].payload, Bytes::from("hi"));
    assert_eq!(published[0].reply, None);
}

#[tokio::test]
async fn publish_to_explicit_subject() {
    let broker = Arc::new(MemoryBroker::new());

    let (status, _) = post(app(broker.clone()), "/publish?subject=orders.created&message=o1").await;

    assert_eq!(status, StatusCode::OK);
    assert!(broker.published_to("foo").is_empty());
    assert_eq!(
        broker.published_to("orders.created")[0].payload,
        Bytes::from("o1")
    );
}

#[tokio::test]
async fn publish_without_message_sends_timestamped_placeholder() {
    let broker = Arc::new(MemoryBroker::new());

    let (status, _) = post(app(broker.clone()), "/publish").await;

    assert_eq!(status, StatusCode::OK);
    let published = broker.published_to("foo");
    assert_eq!(published.len(), 1);
    let payload = published[0].payload_str().into_owned();
    assert!(payload.starts_with("New message published at "));
    assert!(payload.len() > "New message published at ".len());
}

#[tokio::test]
async fn publish_failure_returns_500() {
    let broker = Arc::new(MemoryBroker::new());
    broker.set_offline(true);

    let (status, body) = post(app(broker.clone()), "/publish?message=hi").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.error, "Failed to publish message");
}

#[tokio::test]
async fn publish_requires_post() {
    let broker = Arc::new(MemoryBroker::new());

    let (status, _) = get(app(broker.clone()), "/publish?message=hi").await;

    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert!(broker.published().is_empty());
}

#[tokio::test]
async fn request_returns_reply_payload_unmodified() {
    let broker = Arc::new(MemoryBroker::new());
    let mut rx = broker.subscribe("foo", 8).await.unwrap();

    let responder = broker.clone();
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            responder.reply(&msg, Bytes::from("pong {\"raw\": true}")).await.unwrap();
        }
    });

    let (status, body) = post(app(broker.clone()), "/request?message=ping").await;

    assert_eq!(status, StatusCode::OK);
    let response: MessageResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(response.message, "pong {\"raw\": true}");
}

#[tokio::test]
async fn request_through_subscriber_relay() {
    let broker = Arc::new(MemoryBroker::new());
    let messages = broker.subscribe("foo", BUFFER_CAPACITY).await.unwrap();
    let relay = Relay::new(broker.clone(), RelayMetrics::detached());
    tokio::spawn(relay.consume(messages));

    let (status, body) = post(app(broker.clone()), "/request?message=ping").await;

    assert_eq!(status, StatusCode::OK);
    let response: MessageResponse = serde_json::from_slice(&body).unwrap();
    assert!(response.message.starts_with("Replying to ping on _INBOX."));
}

#[tokio::test(start_paused = true)]
async fn request_without_reply_in_time_returns_500() {
    let broker = Arc::new(MemoryBroker::new());
    let _silent = broker.subscribe("foo", 8).await.unwrap();

    let (status, body) = post(app(broker.clone()), "/request?message=ping").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.error, "Failed to request message");
}

#[tokio::test]
async fn request_without_responders_returns_500() {
    let broker = Arc::new(MemoryBroker::new());

    let (status, _) = post(app(broker), "/request?subject=nobody").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn health_is_always_ok() {
    let broker = Arc::new(MemoryBroker::new());
    broker.set_offline(true);

    let (status, body) = get(app(broker), "/health").await;

    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn ready_follows_broker_connection() {
    let broker = Arc::new(MemoryBroker::new());

    let (status, body) = get(app(broker.clone()), "/ready").await;
    assert_eq!(status, StatusCode::OK);
    let ready: ReadyResponse = serde_json::from_slice(&body).unwrap();
    assert!(ready.ready);
    assert_eq!(ready.default_subject, "foo");
    assert!(!ready.timer_enabled);

    broker.set_offline(true);
    let (status, body) = get(app(broker), "/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let ready: ReadyResponse = serde_json::from_slice(&body).unwrap();
    assert!(!ready.nats_connected);
}

#[tokio::test]
async fn metrics_endpoint_serves_text() {
    let broker = Arc::new(MemoryBroker::new());

    let response = app(broker)
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/plain; charset=utf-8"
    );
}
