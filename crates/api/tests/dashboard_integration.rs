//! Integration tests for the public dashboard, health and metrics routes.

mod common;

use axum::http::{header, Method, StatusCode};
use common::{empty_request, json_request, parse_body, roster_row, roster_rows, TestApp};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_empty_dashboard() {
    let app = TestApp::new().await;

    let response = app
        .send(empty_request(Method::GET, "/api/v1/dashboard", None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = parse_body(response).await;
    assert_eq!(body["total"], 0);
    assert_eq!(body["presentCount"], 0);
    assert_eq!(body["pendingCount"], 0);
    assert_eq!(body["progress"], 0);
    assert_eq!(body["presentList"], json!([]));
}

#[tokio::test]
async fn test_dashboard_reflects_checkins() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    app.import(
        &admin,
        json!([
            roster_row("6401001", "Science", None),
            roster_row("6401002", "Science", None),
            roster_row("6401003", "Arts", None),
        ]),
    )
    .await;

    let kiosk = app.kiosk_token().await;
    for code in ["6401001", "6401002"] {
        let response = app
            .send(json_request(
                Method::POST,
                "/api/v1/kiosk/scan",
                Some(&kiosk),
                json!({ "code": code }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let snapshot = app.state.snapshot.clone();
    let mut versions = snapshot.subscribe_versions();
    tokio::time::timeout(
        Duration::from_secs(2),
        versions.wait_for(|_| snapshot.stats().present_count == 2),
    )
    .await
    .unwrap()
    .unwrap();

    let response = app
        .send(empty_request(Method::GET, "/api/v1/dashboard", None))
        .await;
    let body = parse_body(response).await;
    assert_eq!(body["total"], 3);
    assert_eq!(body["presentCount"], 2);
    assert_eq!(body["pendingCount"], 1);
    assert_eq!(body["progress"], 67);

    let list = body["presentList"].as_array().unwrap();
    assert_eq!(list.len(), 2);
    // Most recent check-in first
    assert_eq!(list[0]["studentId"], "6401002");
    assert_eq!(list[1]["studentId"], "6401001");
}

#[tokio::test]
async fn test_monitor_limit_caps_list_not_counts() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    app.import(&admin, roster_rows(6500001, 4)).await;

    let kiosk = app.kiosk_token().await;
    for id in 6500001..6500004 {
        app.send(json_request(
            Method::POST,
            "/api/v1/kiosk/scan",
            Some(&kiosk),
            json!({ "code": id.to_string() }),
        ))
        .await;
    }

    let snapshot = app.state.snapshot.clone();
    let mut versions = snapshot.subscribe_versions();
    tokio::time::timeout(
        Duration::from_secs(2),
        versions.wait_for(|_| snapshot.stats().present_count == 3),
    )
    .await
    .unwrap()
    .unwrap();

    let response = app
        .send(empty_request(Method::GET, "/api/v1/monitor?limit=1", None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_body(response).await;
    assert_eq!(body["presentCount"], 3);
    assert_eq!(body["total"], 4);
    assert_eq!(body["presentList"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_dashboard_events_is_event_stream() {
    let app = TestApp::new().await;

    let response = app
        .send(empty_request(Method::GET, "/api/v1/dashboard/events", None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));
}

#[tokio::test]
async fn test_health_memory_backend() {
    let app = TestApp::new().await;

    let response = app
        .send(empty_request(Method::GET, "/api/health", None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = parse_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["backend"], "memory");
    assert!(body.get("database").is_none());
    assert_eq!(body["roster"]["total"], 0);

    let live = app
        .send(empty_request(Method::GET, "/api/health/live", None))
        .await;
    assert_eq!(live.status(), StatusCode::OK);

    let ready = app
        .send(empty_request(Method::GET, "/api/health/ready", None))
        .await;
    assert_eq!(ready.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_responses_carry_request_id_and_security_headers() {
    let app = TestApp::new().await;

    let mut request = empty_request(Method::GET, "/api/health/live", None);
    request
        .headers_mut()
        .insert("x-request-id", "req-123".parse().unwrap());
    let response = app.send(request).await;

    assert_eq!(response.headers()["x-request-id"], "req-123");
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["x-frame-options"], "DENY");
    assert!(response.headers().get("strict-transport-security").is_none());
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = TestApp::new().await;
    let response = app
        .send(empty_request(Method::GET, "/api/v1/nowhere", None))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
