//! orderhook API server entry point.

use std::sync::Arc;
use std::time::Duration;

use orderhook_api::config::AppConfig;
use orderhook_api::error::AppError;
use orderhook_api::routes;
use orderhook_api::state::AppState;
use orderhook_api::telemetry;
use orderhook_core::clock::{Clock, SystemClock};
use orderhook_core::repository::OrderStore;
use orderhook_core::retry::RetryPolicy;
use orderhook_orders::application::maintenance;
use orderhook_partner::HttpPartnerClient;
use orderhook_store::{InMemoryOrderStore, MIGRATOR, PgOrderStore};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Read configuration from environment.
    let config = AppConfig::from_env()?;

    let telemetry = telemetry::init(config.otlp_endpoint.as_deref())?;

    tracing::info!("Starting orderhook API server");

    let order_store: Arc<dyn OrderStore> = if let Some(database_url) = &config.database_url {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        MIGRATOR.run(&pool).await?;
        Arc::new(PgOrderStore::new(pool))
    } else {
        tracing::warn!("DATABASE_URL is not set; orders are kept in memory only");
        Arc::new(InMemoryOrderStore::new())
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    tokio::spawn(prune_deliveries_periodically(
        clock.clone(),
        order_store.clone(),
        config.delivery_retention,
    ));

    // Build application state.
    let mut app_state = AppState::new(
        clock,
        order_store,
        RetryPolicy::default().with_max_attempts(config.persist_max_attempts),
    );
    for credential in config.partner_credentials() {
        let client = HttpPartnerClient::new(
            credential.client_config(config.partner_timeout, config.partner_max_attempts),
        )?;
        tracing::info!(environment = %credential.environment, "partner webhook enabled");
        app_state = app_state.with_partner(
            credential.environment,
            credential.webhook_secret.clone(),
            Arc::new(client),
        );
    }
    if config.sandbox.is_none() && config.production.is_none() {
        tracing::warn!("no partner credentials configured; both webhooks will answer 404");
    }

    // TODO: Replace CorsLayer::permissive() with the operator console origin once it is fixed.
    let app = routes::app(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server.
    let addr = config.bind_addr()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    telemetry.shutdown();

    Ok(())
}

const PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

async fn prune_deliveries_periodically(
    clock: Arc<dyn Clock>,
    store: Arc<dyn OrderStore>,
    retention: Duration,
) {
    let mut interval = tokio::time::interval(PRUNE_INTERVAL);
    loop {
        interval.tick().await;
        if let Err(e) =
            maintenance::prune_processed_deliveries(clock.as_ref(), store.as_ref(), retention).await
        {
            tracing::warn!(error = %e, "delivery pruning failed");
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
