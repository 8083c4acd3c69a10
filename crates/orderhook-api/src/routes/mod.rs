//! Route modules.

use axum::Router;

use crate::state::AppState;

pub mod health;
pub mod orders;
pub mod webhook;

/// Builds the full application router. `main.rs` and the integration tests
/// share this so they serve the same routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(webhook::router())
        .nest("/api/v1/orders", orders::router())
        .with_state(state)
}
