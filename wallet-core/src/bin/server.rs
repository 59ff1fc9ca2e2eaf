//! Wallet server binary
//!
//! Opens the wallet and serves its Prometheus metrics on
//! `metrics_listen_addr`. HTTP routing for wallet requests lives in the
//! request-handling layer.

use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::sync::Arc;
use wallet_core::{Config, Wallet};

async fn metrics_handler(State(wallet): State<Arc<Wallet>>) -> Result<String, (StatusCode, String)> {
    wallet.metrics().export().map_err(|err| {
        tracing::error!(error = %err, "Failed to export metrics");
        (StatusCode::INTERNAL_SERVER_ERROR, err.public_message())
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        "Starting wallet server"
    );

    let metrics_addr = config.metrics_addr()?;
    let wallet = Arc::new(Wallet::open(config).await?);
    tracing::info!(
        items = wallet.catalog().len(),
        starting_balance = wallet.config().wallet.starting_balance,
        "Wallet ready"
    );

    if !wallet.check_coin_conservation().await? {
        anyhow::bail!("coin conservation check failed on startup");
    }

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(wallet);

    let listener = tokio::net::TcpListener::bind(metrics_addr).await?;
    tracing::info!(addr = %metrics_addr, "Serving metrics");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "Failed to listen for shutdown signal");
            }
        })
        .await?;

    tracing::info!("Shutting down wallet server");
    Ok(())
}
