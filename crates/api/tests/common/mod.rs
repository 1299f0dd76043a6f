//! Common test utilities for integration tests.
//!
//! Every test builds its own router over the in-memory backend, with the
//! snapshot maintainer running, so no database is needed.

// Not every helper is used by every test binary.
#![allow(dead_code)]

use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, Request, Response, StatusCode},
    Router,
};
use fake::faker::name::en::Name;
use fake::Fake;
use gradcheck_api::app::{create_app, AppState, Stores};
use gradcheck_api::config::{AdminBootstrapConfig, Config};
use gradcheck_api::services::bootstrap_admin;
use serde_json::{json, Value};
use tokio::sync::watch;
use tower::ServiceExt;

pub const SECRET: &str = "0123456789abcdef0123456789abcdef";
pub const PASSCODE: &str = "2468";
pub const ADMIN_EMAIL: &str = "registrar@grad.example.ac.th";
pub const ADMIN_PASSWORD: &str = "correct horse battery";

/// Test configuration: memory backend, HS256 tokens, zero kiosk delays.
pub fn test_config(extra: &[(&str, &str)]) -> Config {
    let mut overrides = vec![
        ("database.backend", "memory"),
        ("jwt.secret", SECRET),
        ("kiosk.passcode", PASSCODE),
        ("kiosk.error_delay_ms", "0"),
        ("kiosk.success_delay_ms", "0"),
        ("kiosk.search_debounce_ms", "0"),
        ("logging.level", "warn"),
    ];
    overrides.extend_from_slice(extra);
    let config = Config::load_for_test(&overrides).expect("Failed to load test config");
    config.validate().expect("Test config must be valid");
    config
}

/// A running application over fresh in-memory stores.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _shutdown: watch::Sender<bool>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config(&[])).await
    }

    pub async fn with_config(config: Config) -> Self {
        let state = AppState::new(config, Stores::memory()).expect("Failed to build state");

        let bootstrap = AdminBootstrapConfig {
            bootstrap_email: ADMIN_EMAIL.to_string(),
            bootstrap_password: ADMIN_PASSWORD.to_string(),
            bootstrap_display_name: "Registrar".to_string(),
        };
        bootstrap_admin(state.accounts.as_ref(), &bootstrap)
            .await
            .expect("Failed to bootstrap admin");

        let (shutdown, shutdown_rx) = watch::channel(false);
        state.snapshot.refresh().await.expect("Initial snapshot");
        state
            .snapshot
            .clone()
            .spawn_maintainer(&state.feed, shutdown_rx);

        Self {
            router: create_app(state.clone()),
            state,
            _shutdown: shutdown,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Router is infallible")
    }

    /// Signs in the bootstrap admin and returns the bearer token.
    pub async fn admin_token(&self) -> String {
        let response = self
            .send(json_request(
                Method::POST,
                "/api/v1/auth/login",
                None,
                json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = parse_body(response).await;
        body["accessToken"].as_str().unwrap().to_string()
    }

    /// Unlocks a new kiosk and returns its bearer token.
    pub async fn kiosk_token(&self) -> String {
        let response = self
            .send(json_request(
                Method::POST,
                "/api/v1/kiosk/unlock",
                None,
                json!({ "passcode": PASSCODE }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = parse_body(response).await;
        body["accessToken"].as_str().unwrap().to_string()
    }

    /// Imports rows through the admin API.
    pub async fn import(&self, token: &str, rows: Value) -> Value {
        let response = self
            .send(json_request(
                Method::POST,
                "/api/v1/admin/graduates/import",
                Some(token),
                json!({ "rows": rows }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        parse_body(response).await
    }

    /// Waits until the snapshot has reached at least `version`.
    pub async fn wait_for_version(&self, version: u64) {
        let mut versions = self.state.snapshot.subscribe_versions();
        tokio::time::timeout(Duration::from_secs(2), versions.wait_for(|v| *v >= version))
            .await
            .expect("Snapshot did not reach expected version")
            .expect("Snapshot cache dropped");
    }

    /// Waits until the snapshot reports `total` entries.
    pub async fn wait_for_total(&self, total: usize) {
        let mut versions = self.state.snapshot.subscribe_versions();
        let snapshot = self.state.snapshot.clone();
        tokio::time::timeout(
            Duration::from_secs(2),
            versions.wait_for(|_| snapshot.stats().total == total),
        )
        .await
        .expect("Snapshot did not reach expected total")
        .expect("Snapshot cache dropped");
    }
}

/// Builds a request with an optional bearer token and JSON body.
pub fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

/// Builds a body-less request with an optional bearer token.
pub fn empty_request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn parse_body(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(Value::Null)
}

/// One spreadsheet row as the admin client sends it.
pub fn roster_row(student_id: &str, faculty: &str, degree: Option<&str>) -> Value {
    let fullname: String = Name().fake();
    let mut row = json!({
        "student_id": student_id,
        "fullname": fullname,
        "faculty": faculty,
    });
    if let Some(degree) = degree {
        row["degree"] = json!(degree);
    }
    row
}

/// `count` generated rows with sequential student ids.
pub fn roster_rows(first_id: u64, count: u64) -> Value {
    Value::Array(
        (first_id..first_id + count)
            .map(|id| roster_row(&id.to_string(), "Engineering", None))
            .collect(),
    )
}
