//! Integration tests for the URL shortener API
//!
//! These tests verify the entire application stack including:
//! - HTTP routing
//! - Request/response handling
//! - Registry operations
//! - Enrichment state as seen by the read paths

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tower::ServiceExt;

use urlshortener::config::Config;
use urlshortener::database::Registry;
use urlshortener::qr::{EncodeError, QrEncoder};
use urlshortener::reachability::{ProbeError, Prober};
use urlshortener::route::create_app;
use urlshortener::state::AppState;

/// Reports every target as reachable except those under `down.test`
struct StubProber;

#[async_trait]
impl Prober for StubProber {
    async fn head(&self, url: &str) -> Result<u16, ProbeError> {
        if url.contains("down.test") {
            Ok(404)
        } else {
            Ok(200)
        }
    }
}

struct StubEncoder;

impl QrEncoder for StubEncoder {
    fn encode(&self, _text: &str) -> Result<Bytes, EncodeError> {
        Ok(Bytes::from_static(b"\x89PNG-fake"))
    }
}

/// Helper function to create a test application with a temporary database
fn setup_test_app_with(config: Config) -> (axum::Router, AppState, NamedTempFile) {
    let temp_db = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = temp_db.path().to_str().unwrap();

    let registry = Registry::open(db_path).expect("Failed to initialize test database");
    // Classification is driven by hand in these tests, so safety requests are dropped
    let (state, _requests) = AppState::new(config, registry, Arc::new(StubProber), Arc::new(StubEncoder));

    (create_app(state.clone()), state, temp_db)
}

fn setup_test_app() -> (axum::Router, AppState, NamedTempFile) {
    setup_test_app_with(Config::default())
}

/// Helper function to parse response body as JSON
async fn response_json(body: Body) -> Value {
    let bytes = body
        .collect()
        .await
        .expect("Failed to read response body")
        .to_bytes();

    serde_json::from_slice(&bytes).expect("Failed to parse JSON")
}

fn create_request(payload: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/link")
        .header("content-type", "application/json")
        .header("x-forwarded-for", "10.0.0.1")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("x-forwarded-for", "192.168.1.7")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_create_short_url_success() {
    let (app, state, _temp_db) = setup_test_app();

    let response = app
        .oneshot(create_request(json!({ "url": "http://example.com/", "qr": false })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers().get("location").unwrap(), "http://localhost:8080/f684a3c4");

    let body = response_json(response.into_body()).await;
    assert_eq!(body["url"], "http://localhost:8080/f684a3c4");
    assert_eq!(body["properties"], json!({}));

    let stored = state.registry.find_by_key("f684a3c4").unwrap().unwrap();
    assert_eq!(stored.owner_ip, "10.0.0.1");
    assert_eq!(state.reachability.pending(), 1);
}

#[tokio::test]
async fn test_create_short_url_with_qr() {
    let (app, state, _temp_db) = setup_test_app();

    let response = app
        .oneshot(create_request(json!({ "url": "http://example.com/", "qr": true })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response.into_body()).await;
    assert_eq!(
        body,
        json!({
            "url": "http://localhost:8080/f684a3c4",
            "properties": { "qr": "http://localhost:8080/f684a3c4/qr" }
        })
    );
    assert_eq!(state.qr.pending(), 1);
}

#[tokio::test]
async fn test_create_short_url_invalid() {
    let (app, _state, _temp_db) = setup_test_app();

    let response = app
        .oneshot(create_request(json!({ "url": "ftp://example.com/", "qr": false })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["code"], "invalid_input");
}

#[tokio::test]
async fn test_create_short_url_unsafe() {
    let (app, state, _temp_db) = setup_test_app();

    app.clone()
        .oneshot(create_request(json!({ "url": "http://example.com/" })))
        .await
        .unwrap();
    state.registry.mark_unsafe("f684a3c4").unwrap();

    let response = app
        .oneshot(create_request(json!({ "url": "http://example.com/" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_redirect_waits_for_safety_and_reachability() {
    let (app, state, _temp_db) = setup_test_app();

    app.clone()
        .oneshot(create_request(json!({ "url": "http://example.com/" })))
        .await
        .unwrap();

    // Safety unknown
    let response = app.clone().oneshot(get("/f684a3c4")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers().get("retry-after").unwrap(), "500");

    // Safe, but not probed yet
    state.registry.mark_safe("f684a3c4").unwrap();
    let response = app.clone().oneshot(get("/f684a3c4")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers().get("retry-after").unwrap(), "500");

    // Safe and reachable
    state.reachability.probe_next().await;
    let response = app.clone().oneshot(get("/f684a3c4")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers().get("location").unwrap(), "http://example.com/");

    // The successful redirect was logged as a click
    state.ranking.recompute().unwrap();
    let response = app.clone().oneshot(get("/api/link/urls")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response.into_body()).await;
    assert_eq!(body, json!({ "list": [{ "hash": "f684a3c4", "sum": 1 }] }));

    let response = app.oneshot(get("/api/link/users")).await.unwrap();
    let body = response_json(response.into_body()).await;
    assert_eq!(body, json!({ "list": [{ "ip": "192.168.1.7", "sum": 1 }] }));
}

#[tokio::test]
async fn test_redirect_unreachable_target() {
    let (app, state, _temp_db) = setup_test_app();

    let response = app
        .clone()
        .oneshot(create_request(json!({ "url": "http://down.test/page" })))
        .await
        .unwrap();
    let body = response_json(response.into_body()).await;
    let hash = body["url"].as_str().unwrap().rsplit('/').next().unwrap().to_string();

    state.registry.mark_safe(&hash).unwrap();
    state.reachability.probe_next().await;

    let response = app.oneshot(get(&format!("/{}", hash))).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(state.registry.click_counts_by_hash().unwrap().is_empty());
}

#[tokio::test]
async fn test_redirect_unsafe_target() {
    let (app, state, _temp_db) = setup_test_app();

    app.clone()
        .oneshot(create_request(json!({ "url": "http://example.com/" })))
        .await
        .unwrap();
    state.registry.mark_unsafe("f684a3c4").unwrap();
    state.reachability.probe_next().await;

    let response = app.oneshot(get("/f684a3c4")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_redirect_url_not_found() {
    let (app, _state, _temp_db) = setup_test_app();

    let response = app.oneshot(get("/nonexistent")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_qr_endpoint_lifecycle() {
    let (app, state, _temp_db) = setup_test_app();

    let response = app.clone().oneshot(get("/f684a3c4/qr")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.clone()
        .oneshot(create_request(json!({ "url": "http://example.com/", "qr": true })))
        .await
        .unwrap();

    let response = app.clone().oneshot(get("/f684a3c4/qr")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get("retry-after").is_some());

    state.qr.generate_next().await;

    let response = app.oneshot(get("/f684a3c4/qr")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/png");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"\x89PNG-fake");
}

#[tokio::test]
async fn test_qr_endpoint_without_qr_requested() {
    let (app, _state, _temp_db) = setup_test_app();

    app.clone()
        .oneshot(create_request(json!({ "url": "http://example.com/", "qr": false })))
        .await
        .unwrap();

    let response = app.oneshot(get("/f684a3c4/qr")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["code"], "not_yet_available");
}

#[tokio::test]
async fn test_list_links_of_submitter() {
    let (app, _state, _temp_db) = setup_test_app();

    for i in 1..=3 {
        app.clone()
            .oneshot(create_request(json!({ "url": format!("https://example.com/url{}", i) })))
            .await
            .unwrap();
    }

    let response = app
        .clone()
        .oneshot(get("/api/link?ip=10.0.0.1&page=1&limit=2"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["total_fetched"], 2);
    assert_eq!(body["limit"], 2);

    let response = app.clone().oneshot(get("/api/link?ip=10.0.0.1&page=2&limit=2")).await.unwrap();
    let body = response_json(response.into_body()).await;
    assert_eq!(body["total_fetched"], 1);

    let response = app.oneshot(get("/api/link?ip=10.0.0.2")).await.unwrap();
    let body = response_json(response.into_body()).await;
    assert_eq!(body["total_fetched"], 0);
}

#[tokio::test]
async fn test_delete_short_url() {
    let (app, state, _temp_db) = setup_test_app();

    app.clone()
        .oneshot(create_request(json!({ "url": "http://example.com/" })))
        .await
        .unwrap();

    let delete = || {
        Request::builder()
            .method("DELETE")
            .uri("/api/link/f684a3c4")
            .body(Body::empty())
            .unwrap()
    };

    let response = app.clone().oneshot(delete()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response.into_body()).await;
    assert_eq!(body["deleted_id"], "f684a3c4");
    assert!(state.registry.find_by_key("f684a3c4").unwrap().is_none());

    let response = app.oneshot(delete()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_api_requires_configured_authorization() {
    let (app, _state, _temp_db) = setup_test_app_with(Config {
        authorization: Some("secret_token".to_string()),
        ..Config::default()
    });

    let response = app
        .clone()
        .oneshot(create_request(json!({ "url": "http://example.com/" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let mut request = create_request(json!({ "url": "http://example.com/" }));
    request
        .headers_mut()
        .insert("Authorization", "secret_token".parse().unwrap());
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Public routes are not guarded
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
