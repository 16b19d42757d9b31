//! RELAY API Server Entry Point
//!
//! Loads configuration from the environment, starts the handoff expiry job,
//! and serves the Axum router until Ctrl-C.

use axum::Router;
use relay_api::jobs::{handoff_expiry_task, HandoffExpiryConfig};
use relay_api::telemetry::init_tracing;
use relay_api::{create_api_router, ApiConfig, ApiError, ApiResult, AppState};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let config = ApiConfig::from_env()?;
    init_tracing(config.log_format)?;

    let state = AppState::new(config.relay.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let expiry = tokio::spawn(handoff_expiry_task(
        state.handoffs.clone(),
        HandoffExpiryConfig::from(&config),
        shutdown_rx,
    ));

    let app: Router = create_api_router(state, &config);

    let addr = config.bind_addr()?;
    tracing::info!(
        %addr,
        selection_strategy = ?config.relay.selection_strategy,
        "Starting RELAY API server"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = expiry.await {
        tracing::warn!(error = %e, "Handoff expiry task did not shut down cleanly");
    }
    Ok(())
}
