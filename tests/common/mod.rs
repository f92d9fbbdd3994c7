//! Shared helpers for the integration tests.
//!
//! Each test file is its own crate, so helpers used by only one of them
//! would warn as dead code elsewhere.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tasknest::{map_routes, persist::SaveFile, AppState, SharedState};
use tempfile::TempDir;
use tower::ServiceExt;

pub const SECRET: &str = "integration-test-secret-0123456789";

/// Router backed by a fresh redb file. Keep `dir` alive for the test.
pub struct TestApp {
    pub router: Router,
    pub state: SharedState,
    pub dir: TempDir,
}

pub fn test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let save_file = SaveFile::open(dir.path().join("tasks.redb")).unwrap();
    let state = AppState::from_save_file(save_file, SECRET, 60).into_shared();
    TestApp {
        router: map_routes(state.clone()),
        state,
        dir,
    }
}

/// No store, no identity provider.
pub fn demo_app() -> Router {
    map_routes(AppState::default().into_shared())
}

/// Store configured but tokens unverified.
pub fn unverified_app() -> (Router, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let save_file = SaveFile::open(dir.path().join("tasks.redb")).unwrap();
    let state = AppState::new(Some(std::sync::Arc::new(save_file)), None).into_shared();
    (map_routes(state), dir)
}

/// Three segments, well over 100 characters, signature never checked.
pub fn unverified_token() -> String {
    format!("eyJhbGciOiJSUzI1NiJ9.{}.c2ln", "e".repeat(93))
}

pub async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// Sign up through `/api/identity/signup`; returns (token, uid).
pub async fn sign_up(router: &Router, email: &str) -> (String, String) {
    let (status, body) = send(
        router,
        Method::POST,
        "/api/identity/signup",
        None,
        Some(json!({ "email": email, "password": "secret1", "displayName": "Tester" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    (
        body["token"].as_str().unwrap().to_string(),
        body["user"]["uid"].as_str().unwrap().to_string(),
    )
}

pub async fn create_task(router: &Router, token: &str, title: &str, due: &str) -> Value {
    let (status, body) = send(
        router,
        Method::POST,
        "/api/tasks",
        Some(token),
        Some(json!({ "title": title, "dueDate": due })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["task"].clone()
}
