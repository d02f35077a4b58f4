// tests/api_http.rs
//
// HTTP-level tests for the status Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::Value as Json;
use std::sync::Arc;
use tower::ServiceExt as _; // for `oneshot`

use news_relay::api;
use news_relay::clock::SystemClock;
use news_relay::dedup::memory::MemoryFingerprintStore;
use news_relay::ingest::providers::replay::ReplaySource;
use news_relay::metrics::Metrics;
use news_relay::publish::queue::QueueTask;
use news_relay::testing::RecordingPublisher;
use news_relay::transform::rules::RuleTransform;
use news_relay::{PublishPayload, Relay, RelayConfig};

const BODY_LIMIT: usize = 1024 * 1024;

fn test_relay() -> Relay {
    let cfg = Arc::new(RelayConfig {
        queue_capacity: 7,
        ..RelayConfig::default()
    });
    Relay::new(
        cfg.clone(),
        Arc::new(ReplaySource::new()),
        Arc::new(RuleTransform::from_config(&cfg)),
        Arc::new(MemoryFingerprintStore::new(cfg.fingerprint_ttl())),
        Arc::new(RecordingPublisher::new()),
        Arc::new(SystemClock),
    )
}

async fn get(app: Router, uri: &str) -> (StatusCode, String) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    (status, String::from_utf8(bytes.to_vec()).expect("utf8"))
}

#[tokio::test]
async fn health_returns_ok() {
    let relay = test_relay();
    let (status, body) = get(api::create_router(relay.status()), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.trim(), "ok");
}

#[tokio::test]
async fn status_reports_queue_and_worker() {
    let relay = test_relay();
    relay
        .queue()
        .enqueue(QueueTask::new(
            PublishPayload::news("BBCPersian", "A pending item waiting for the worker", None),
            Utc::now(),
        ))
        .await
        .unwrap();

    let (status, body) = get(api::create_router(relay.status()), "/status").await;
    assert_eq!(status, StatusCode::OK);

    let v: Json = serde_json::from_str(&body).expect("json body");
    assert_eq!(v["queue_depth"], 1);
    assert_eq!(v["queue_capacity"], 7);
    assert_eq!(v["worker_state"], "idle");
    assert_eq!(v["backfill_done"], false);
}

#[tokio::test]
async fn unknown_route_is_404() {
    let relay = test_relay();
    let (status, _) = get(api::create_router(relay.status()), "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_endpoint_serves_prometheus_text() {
    // Building the relay first must not swallow the metric descriptions.
    let relay = test_relay();
    let metrics = Metrics::init().expect("install recorder");
    relay
        .queue()
        .enqueue(QueueTask::new(
            PublishPayload::proxy_text("iProxyem", "cfg"),
            Utc::now(),
        ))
        .await
        .unwrap();

    let app = api::create_router(relay.status()).merge(metrics.router());
    let (status, body) = get(app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("relay_queue_depth"), "body was: {body}");
    assert!(
        body.contains("# HELP relay_queue_depth"),
        "descriptions missing, body was: {body}"
    );
}
