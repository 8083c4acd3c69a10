//! Operator routes for orders.

use axum::extract::{Path, State};
use axum::{
    Json, Router,
    routing::{get, post},
};
use orderhook_orders::application::command_handlers::{self, CommandContext};
use orderhook_orders::application::query_handlers::{self, OrderView};
use orderhook_orders::domain::commands;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

fn command_context(state: &AppState) -> CommandContext<'_> {
    CommandContext {
        clock: state.clock.as_ref(),
        store: state.order_store.as_ref(),
        partners: state.partners(),
        persist_retry: &state.persist_retry,
    }
}

/// GET /{order_id}
#[instrument(skip(state))]
async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    let view = query_handlers::get_order_by_id(&order_id, state.order_store.as_ref()).await?;
    Ok(Json(view))
}

/// POST /{order_id}/accept
#[instrument(skip(state))]
async fn accept_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    let command = commands::AcceptOrder {
        correlation_id: Uuid::new_v4(),
        order_id,
    };

    info!(correlation_id = %command.correlation_id, "handling accept_order command");

    let view = command_handlers::handle_accept_order(&command, &command_context(&state)).await?;
    Ok(Json(view))
}

/// POST /{order_id}/reject
#[instrument(skip(state))]
async fn reject_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    let command = commands::RejectOrder {
        correlation_id: Uuid::new_v4(),
        order_id,
    };

    info!(correlation_id = %command.correlation_id, "handling reject_order command");

    let view = command_handlers::handle_reject_order(&command, &command_context(&state)).await?;
    Ok(Json(view))
}

/// POST /{order_id}/confirm
#[instrument(skip(state))]
async fn confirm_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    let command = commands::ConfirmOrder {
        correlation_id: Uuid::new_v4(),
        order_id,
    };

    info!(correlation_id = %command.correlation_id, "handling confirm_order command");

    let view = command_handlers::handle_confirm_order(&command, &command_context(&state)).await?;
    Ok(Json(view))
}

/// Returns the router for order queries and operator commands.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{order_id}", get(get_order))
        .route("/{order_id}/accept", post(accept_order))
        .route("/{order_id}/reject", post(reject_order))
        .route("/{order_id}/confirm", post(confirm_order))
}
