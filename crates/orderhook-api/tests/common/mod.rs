//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use orderhook_core::clock::Clock;
use orderhook_core::order::PartnerEnvironment;
use orderhook_core::retry::RetryPolicy;
use orderhook_core::secret::Secret;
use orderhook_store::PgOrderStore;
use orderhook_test_support::{FixedClock, RecordingPartner};
use sqlx::PgPool;
use tower::ServiceExt;

use orderhook_api::routes;
use orderhook_api::signature::{SEQUENCE_GUID_HEADER, SIGNATURE_HEADER, sign};
use orderhook_api::state::AppState;

/// Webhook secret for the sandbox environment in every integration test.
pub const SANDBOX_SECRET: &str = "integration-sandbox-secret";

/// Fixed timestamp used across all integration tests.
fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(
        chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2026, 1, 15, 10, 0, 0).unwrap(),
    ))
}

/// Build the full app router with a real `PgOrderStore` and a sandbox
/// partner that accepts every call.
pub fn build_test_app(pool: PgPool) -> Router {
    build_test_app_with_partner(pool, Arc::new(RecordingPartner::new()))
}

/// Build the full app router with `partner` serving both environments.
/// Only the sandbox webhook is enabled.
pub fn build_test_app_with_partner(pool: PgPool, partner: Arc<RecordingPartner>) -> Router {
    let order_store = Arc::new(PgOrderStore::new(pool));
    let app_state = AppState::new(fixed_clock(), order_store, RetryPolicy::immediate(3))
        .with_partner(
            PartnerEnvironment::Sandbox,
            Secret::new(SANDBOX_SECRET),
            partner,
        );

    routes::app(app_state)
}

/// Send a signed delivery to the sandbox webhook and return the response.
pub async fn post_webhook(
    app: Router,
    payload: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let body = serde_json::to_vec(payload).unwrap();
    let guid = uuid::Uuid::new_v4().to_string();
    let signature = sign(&body, Some(&guid), &Secret::new(SANDBOX_SECRET));
    let request = Request::builder()
        .method("POST")
        .uri("/dev-webhook")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, signature)
        .header(SEQUENCE_GUID_HEADER, guid)
        .body(Body::from(body))
        .unwrap();

    send(app, request).await
}

/// Send a POST request without a body and return the response.
pub async fn post_empty(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// An `order.new` delivery for `order_id` with one mapped item.
pub fn order_new(order_id: &str) -> serde_json::Value {
    serde_json::json!({
        "event": "order.new",
        "body": {"order": {
            "id": order_id,
            "order_number": "0042",
            "location_id": "7",
            "status": "placed",
            "status_log": [{"at": "2026-01-15T09:59:00Z", "status": "placed"}],
            "items": [{
                "pos_item_id": "burger-1",
                "name": "Burger",
                "quantity": 1,
                "modifiers": []
            }],
            "restaurant": {"name": "Burger Barn"}
        }}
    })
}

/// An `order.status_update` delivery moving `order_id` to `status` at `at`.
pub fn status_update(order_id: &str, status: &str, at: &str) -> serde_json::Value {
    serde_json::json!({
        "event": "order.status_update",
        "body": {"order": {
            "id": order_id,
            "status": status,
            "status_log": [
                {"at": "2026-01-15T09:59:00Z", "status": "placed"},
                {"at": at, "status": status}
            ]
        }}
    })
}
