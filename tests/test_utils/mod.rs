//! Test utilities for integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{Router, body::Body};
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::{Value, json};

use tempmail::api::{AppState, SharedState, app};
use tempmail::core::{AppConfig, RateLimit};

pub const ADMIN_TOKEN: &str = "test-admin-token";
pub const ACCOUNT_ID: &str = "64b7f0c2a1b2c3d4e5f60001";
pub const TOKEN: &str = "test-jwt-token";
pub const MESSAGE_ID: &str = "64b7f0c2a1b2c3d4e5f60718";

/// Config pointing at a fake Mail.tm with limits no test trips by accident.
pub fn test_config(mailtm_url: &str) -> AppConfig {
    let generous = RateLimit::new(1000, Duration::from_secs(60));
    AppConfig {
        mailtm_base_url: mailtm_url.to_string(),
        cors_origin: None,
        admin_token: Some(ADMIN_TOKEN.to_string()),
        static_dir: "./web".to_string(),
        provider_timeout: Duration::from_secs(5),
        session_idle_ttl: Duration::from_secs(60 * 60 * 24),
        sweep_interval: Duration::from_secs(60 * 60),
        general_rate_limit: generous,
        creation_rate_limit: generous,
        message_rate_limit: generous,
    }
}

pub fn test_state(config: AppConfig) -> SharedState {
    Arc::new(AppState::new(config).expect("Failed to build app state"))
}

/// Creates a test application router backed by the Mail.tm at `mailtm_url`.
pub fn test_app(mailtm_url: &str) -> Router {
    app(test_state(test_config(mailtm_url)))
}

pub fn test_app_with_config(config: AppConfig) -> Router {
    app(test_state(config))
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Failed to read body");
    String::from_utf8(bytes.to_vec()).expect("Body is not utf-8")
}

pub async fn body_to_json(body: Body) -> Value {
    let text = body_to_string(body).await;
    serde_json::from_str(&text).expect("Body is not json")
}

/// Mock the two Mail.tm calls behind account creation.
pub async fn mock_account_creation(server: &mut ServerGuard, address: &str) -> (Mock, Mock) {
    let account = server
        .mock("POST", "/accounts")
        .with_status(201)
        .with_header("content-type", "application/ld+json")
        .with_body(
            json!({
                "@id": format!("/accounts/{}", ACCOUNT_ID),
                "id": ACCOUNT_ID,
                "address": address,
                "quota": 40000000,
                "used": 0,
                "isDisabled": false,
                "isDeleted": false,
                "createdAt": "2025-01-01T00:00:00+00:00",
                "updatedAt": "2025-01-01T00:00:00+00:00"
            })
            .to_string(),
        )
        .create_async()
        .await;
    let token = server
        .mock("POST", "/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "id": ACCOUNT_ID, "token": TOKEN }).to_string())
        .create_async()
        .await;
    (account, token)
}

/// Mock the message listing with `messages` as `(id, seen)` pairs.
pub async fn mock_messages(server: &mut ServerGuard, messages: &[(&str, bool)]) -> Mock {
    let members: Vec<Value> = messages
        .iter()
        .map(|(id, seen)| {
            json!({
                "@id": format!("/messages/{}", id),
                "id": id,
                "accountId": format!("/accounts/{}", ACCOUNT_ID),
                "from": { "address": "sender@example.com", "name": "Sender" },
                "to": [{ "address": "foo@domain.com", "name": "" }],
                "subject": format!("Subject {}", id),
                "intro": "Hello",
                "seen": seen,
                "hasAttachments": false,
                "size": 1024,
                "createdAt": "2025-01-01T00:00:00+00:00"
            })
        })
        .collect();

    server
        .mock("GET", Matcher::Regex(r"^/messages(\?|$)".to_string()))
        .match_query(Matcher::Any)
        .match_header("authorization", format!("Bearer {}", TOKEN).as_str())
        .with_status(200)
        .with_header("content-type", "application/ld+json")
        .with_body(
            json!({
                "hydra:member": members,
                "hydra:totalItems": messages.len()
            })
            .to_string(),
        )
        .create_async()
        .await
}

pub fn generate_body(address: &str, password: &str) -> Body {
    Body::from(json!({ "address": address, "password": password }).to_string())
}
