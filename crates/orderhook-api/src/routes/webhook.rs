//! Partner webhook endpoints.
//!
//! `POST /dev-webhook` receives sandbox deliveries and `POST /prod-webhook`
//! production ones. Each request is verified against the environment's
//! webhook secret before its body is parsed.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing::post};
use orderhook_core::error::DomainError;
use orderhook_core::order::PartnerEnvironment;
use orderhook_orders::application::dispatcher::{self, DispatchContext, DispatchOutcome};
use orderhook_orders::domain::events::OrderEvent;
use serde::Serialize;
use tracing::{debug, error, instrument, warn};

use crate::error::{ApiError, ErrorBody};
use crate::signature::{SEQUENCE_GUID_HEADER, SIGNATURE_HEADER, verify_signature};
use crate::state::AppState;

/// Acknowledgement body.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Human-readable acknowledgement.
    pub message: &'static str,
}

/// POST /dev-webhook
async fn dev_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    receive(&state, PartnerEnvironment::Sandbox, &headers, &body).await
}

/// POST /prod-webhook
async fn prod_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    receive(&state, PartnerEnvironment::Production, &headers, &body).await
}

fn acknowledged() -> Response {
    (
        StatusCode::OK,
        Json(WebhookResponse {
            message: "Order received successfully",
        }),
    )
        .into_response()
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

#[instrument(skip(state, headers, body), fields(body_len = body.len()))]
async fn receive(
    state: &AppState,
    environment: PartnerEnvironment,
    headers: &HeaderMap,
    body: &[u8],
) -> Response {
    let Some(endpoint) = state.partner(environment) else {
        return ErrorBody::respond(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("no webhook is configured for {environment}"),
        );
    };

    if let Err(err) = verify_signature(
        body,
        header(headers, SIGNATURE_HEADER),
        header(headers, SEQUENCE_GUID_HEADER),
        &endpoint.webhook_secret,
    ) {
        warn!(error = %err, "rejecting webhook with invalid signature");
        return ApiError(err).into_response();
    }

    if environment == PartnerEnvironment::Sandbox {
        debug!(payload = %String::from_utf8_lossy(body), "sandbox webhook payload");
    }

    let event = match OrderEvent::from_payload(body, environment, state.clock.now()) {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "ignoring malformed webhook payload");
            return acknowledged();
        }
    };

    let ctx = DispatchContext {
        clock: state.clock.as_ref(),
        store: state.order_store.as_ref(),
        partner: endpoint.gateway.as_ref(),
        persist_retry: &state.persist_retry,
    };

    match dispatcher::dispatch(&event, &ctx).await {
        Ok(DispatchOutcome::Recorded(_)) => acknowledged(),
        Ok(DispatchOutcome::UnmappedItems(status)) => {
            (StatusCode::BAD_REQUEST, Json(status)).into_response()
        }
        Err(err @ (DomainError::UnsupportedEvent(_) | DomainError::MalformedEvent(_))) => {
            warn!(
                error = %err,
                order_id = %event.order_id,
                event_type = %event.event_type,
                "webhook event ignored"
            );
            acknowledged()
        }
        Err(err) => {
            error!(
                error = %err,
                order_id = %event.order_id,
                event_type = %event.event_type,
                "webhook event could not be processed"
            );
            ApiError(err).into_response()
        }
    }
}

/// Returns the webhook router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dev-webhook", post(dev_webhook))
        .route("/prod-webhook", post(prod_webhook))
}
