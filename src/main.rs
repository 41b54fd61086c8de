use std::sync::Arc;

use laundry_lifecycle::api;
use laundry_lifecycle::config::Config;
use laundry_lifecycle::engine::reconcile::run_reconciliation_sweep;
use laundry_lifecycle::error::AppError;
use laundry_lifecycle::state::AppState;
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let shared_state = Arc::new(AppState::new(config.event_buffer_size));

    let app = api::rest::router(shared_state.clone());

    if config.reconcile_interval_secs > 0 {
        tokio::spawn(run_reconciliation_sweep(
            shared_state.clone(),
            Duration::from_secs(config.reconcile_interval_secs),
        ));
    } else {
        tracing::warn!("reconciliation sweep disabled");
    }

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
