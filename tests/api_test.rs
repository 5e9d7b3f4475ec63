//! HTTP surface tests driven through the router without binding a socket.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use poolgame::{
    api::ApiServer, config::PoolConfig, BroadcastPublisher, GameEngine, MemoryLedger,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn app() -> Router {
    let config = PoolConfig::default();
    let engine = GameEngine::spawn(
        Arc::new(MemoryLedger::new()),
        BroadcastPublisher::new(64),
        config.games.clone(),
    )
    .await
    .expect("engine should spawn");
    ApiServer::new(config, engine).create_app()
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(body) => Body::from(body.to_string()),
            None => Body::empty(),
        })
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn test_health_and_request_id() {
    let app = app().await;
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "req-7")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "req-7");
}

#[tokio::test]
async fn test_full_game_over_http() {
    let app = app().await;

    let (status, instance) = send(
        &app,
        "POST",
        "/games/start",
        Some(json!({"variant": "investment", "cap": 1000, "multiplier": 1.5})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(instance["status"], "active");
    assert_eq!(instance["multiplier"], 1.5);
    let id = instance["id"].as_str().unwrap().to_string();

    let (status, entry) = send(
        &app,
        "POST",
        "/games/contribute",
        Some(json!({"variant": "investment", "groupId": "A", "amount": 600})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(entry["amount"], 600);

    let (_, entry) = send(
        &app,
        "POST",
        "/games/contribute",
        Some(json!({"variant": "investment", "groupId": "B", "amount": 500})),
    )
    .await;
    assert_eq!(entry["amount"], 400);
    assert_eq!(entry["requestedAmount"], 500);

    let (status, error) = send(
        &app,
        "POST",
        "/games/contribute",
        Some(json!({"variant": "investment", "groupId": "C", "amount": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"]["code"], "CAP_EXCEEDED");
    assert!(error["requestId"].is_string());

    let (status, game) = send(&app, "GET", "/games/investment", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(game["instance"]["total"], 1000);

    let (status, settled) = send(
        &app,
        "POST",
        "/games/end",
        Some(json!({"variant": "investment"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settled["settlement"]["payoutByGroup"]["A"], 900);
    assert_eq!(settled["settlement"]["payoutByGroup"]["B"], 600);

    let (status, entries) = send(&app, "GET", &format!("/instances/{}/entries", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entries.as_array().unwrap().len(), 2);

    let (status, record) = send(&app, "GET", &format!("/instances/{}/settlement", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["succeeded"], true);

    let (_, game) = send(&app, "GET", "/games/investment", None).await;
    assert!(game["instance"].is_null());
}

#[tokio::test]
async fn test_rejections_carry_codes_and_statuses() {
    let app = app().await;

    let (status, error) = send(
        &app,
        "POST",
        "/games/contribute",
        Some(json!({"variant": "risk", "groupId": "A", "amount": 10})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"]["code"], "NO_ACTIVE_GAME");

    let (status, error) = send(
        &app,
        "POST",
        "/games/start",
        Some(json!({"variant": "risk", "cap": 0, "multiplier": 2.0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"]["code"], "INVALID_CONFIG");

    send(
        &app,
        "POST",
        "/games/start",
        Some(json!({"variant": "risk", "cap": 100, "multiplier": 2.0})),
    )
    .await;
    let (status, error) = send(
        &app,
        "POST",
        "/games/start",
        Some(json!({"variant": "risk", "cap": 100, "multiplier": 2.0})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"]["code"], "ALREADY_ACTIVE");

    let (status, error) = send(
        &app,
        "POST",
        "/games/contribute",
        Some(json!({"variant": "risk", "groupId": "A", "amount": -3})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"]["code"], "INVALID_AMOUNT");

    let (status, error) = send(
        &app,
        "POST",
        "/games/contribute",
        Some(json!({"variant": "risk", "groupId": "  ", "amount": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"]["code"], "BAD_REQUEST");

    let (status, _) = send(
        &app,
        "GET",
        &format!("/instances/{}/settlement", uuid::Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_count_rejections() {
    let app = app().await;
    send(
        &app,
        "POST",
        "/games/end",
        Some(json!({"variant": "risk"})),
    )
    .await;

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(text.contains("poolgame_rejections_total{code=\"NO_ACTIVE_GAME\"} 1"));
    assert!(text.contains("poolgame_http_requests_total"));
}

#[tokio::test]
async fn test_malformed_input_uses_error_envelope() {
    let app = app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/games/contribute")
        .header("content-type", "application/json")
        .body(Body::from("{\"variant\": \"risk\", \"amount\": "))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let error: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(error["error"]["code"], "BAD_REQUEST");
    assert!(error["requestId"].is_string());

    let (status, error) = send(
        &app,
        "POST",
        "/games/start",
        Some(json!({"variant": "lottery", "cap": 10, "multiplier": 1.0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"]["code"], "BAD_REQUEST");

    let (status, error) = send(&app, "GET", "/games/lottery", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"]["code"], "BAD_REQUEST");

    let (status, error) = send(&app, "GET", "/instances/not-a-uuid/entries", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"]["code"], "BAD_REQUEST");
}
