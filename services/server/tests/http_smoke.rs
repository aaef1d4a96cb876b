// Router-level coverage for the HTTP surface: publish validation, health,
// and the metrics readers.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use ripple_adaptive::{AdaptiveBufferManager, AdaptiveThrottler, RuntimeLoad, ThrottleConfig};
use ripple_core::TopicManager;
use ripple_server::app::{build_router, AppState};
use ripple_server::observability;
use tower::ServiceExt;

fn test_state() -> AppState {
    let max_memory = 2 * 1024 * 1024 * 1024;
    let buffers = Arc::new(AdaptiveBufferManager::new(max_memory));
    let throttler = Arc::new(AdaptiveThrottler::new(
        ThrottleConfig::default(),
        Box::new(RuntimeLoad::new(max_memory)),
    ));
    AppState {
        manager: TopicManager::new(Arc::clone(&buffers), Arc::clone(&throttler)),
        buffers,
        throttler,
        started_at: Instant::now(),
        metrics_handle: observability::test_metrics_handle(),
    }
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

#[tokio::test]
async fn publish_requires_a_topic() {
    let app = build_router(test_state());
    let request = json_request("POST", "/publish", serde_json::json!({ "data": { "n": 1 } }));
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = read_json(response).await;
    assert_eq!(payload["success"], serde_json::json!(false));
    assert!(payload["error"].as_str().expect("error").contains("topic"));
}

#[tokio::test]
async fn publish_requires_data() {
    let app = build_router(test_state());
    let request = json_request("POST", "/publish", serde_json::json!({ "topic": "t1" }));
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = read_json(response).await;
    assert_eq!(payload["success"], serde_json::json!(false));
}

#[tokio::test]
async fn publish_rejects_non_post_methods() {
    let app = build_router(test_state());
    let request = Request::builder()
        .method("GET")
        .uri("/publish")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn publish_returns_the_message_id() {
    let app = build_router(test_state());
    let request = json_request(
        "POST",
        "/publish",
        serde_json::json!({ "topic": "orders", "data": { "n": 1 } }),
    );
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert_eq!(payload["success"], serde_json::json!(true));
    assert!(payload["message_id"]
        .as_str()
        .expect("message_id")
        .starts_with("msg-"));
}

#[tokio::test]
async fn publish_scopes_topics_by_tenant_header() {
    let state = test_state();
    let app = build_router(state.clone());

    let request = json_request(
        "POST",
        "/publish",
        serde_json::json!({ "topic": "t", "data": {} }),
    );
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let mut request = json_request(
        "POST",
        "/publish",
        serde_json::json!({ "topic": "t", "data": {} }),
    );
    request
        .headers_mut()
        .insert("x-tenant-id", "acme".parse().expect("header"));
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    // Same topic name, two tenants, two topics.
    assert_eq!(state.manager.topic_count().await, 2);
    assert!(state.manager.get_topic("default-tenant", "t").await.is_ok());
    assert!(state.manager.get_topic("acme", "t").await.is_ok());
}

#[tokio::test]
async fn health_reports_counts_and_memory() {
    let app = build_router(test_state());
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert_eq!(payload["status"], serde_json::json!("healthy"));
    assert_eq!(payload["topics"], serde_json::json!(0));
    assert_eq!(payload["subscribers"], serde_json::json!(0));
    assert!(payload["tasks"].as_u64().is_some());
    assert!(payload["memory"]["alloc_mb"].as_f64().is_some());
    assert!(payload["uptime"].as_str().is_some());
}

#[tokio::test]
async fn metrics_reflect_published_traffic() {
    let state = test_state();
    let app = build_router(state.clone());

    for _ in 0..3 {
        let request = json_request(
            "POST",
            "/publish",
            serde_json::json!({ "topic": "hot", "data": { "v": "x" } }),
        );
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let request = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert_eq!(payload["total_topics"], serde_json::json!(1));
    assert_eq!(payload["total_subscribers"], serde_json::json!(0));
    assert_eq!(payload["slow_subscribers"], serde_json::json!(0));
    let topics = payload["topics"].as_array().expect("topics");
    assert_eq!(topics.len(), 1);
    assert_eq!(topics[0]["name"], serde_json::json!("hot"));
    assert_eq!(topics[0]["tenant_id"], serde_json::json!("default-tenant"));
    assert_eq!(topics[0]["messages_published"], serde_json::json!(3));
    assert_eq!(
        payload["throttler_metrics"]["is_throttling"],
        serde_json::json!(false)
    );
}

#[tokio::test]
async fn index_lists_the_endpoints() {
    let app = build_router(test_state());
    let request = Request::builder()
        .uri("/")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let body = String::from_utf8(bytes.to_vec()).expect("utf8");
    assert!(body.contains("/publish"));
    assert!(body.contains("/subscribe"));
    assert!(body.contains("/health"));
    assert!(body.contains("/metrics"));
}

#[tokio::test]
async fn prometheus_endpoint_renders() {
    let app = build_router(test_state());
    let request = Request::builder()
        .uri("/metrics/prometheus")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}
