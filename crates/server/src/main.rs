use std::time::Duration;

use anyhow::{Context, Result};
use benefitflow_core::config::{AppConfig, LoadOptions};
use benefitflow_server::{api, bootstrap, health};

fn init_logging(config: &AppConfig) {
    use benefitflow_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    let routes = api::router(app.service.clone()).merge(health::router(app.db_pool.clone()));
    drop(app.service);

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "benefitflow-server listening"
    );
    axum::serve(listener, routes).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "benefitflow-server stopping; draining notifications"
    );
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, app.dispatcher).await {
        Ok(Ok(dispatched)) => tracing::info!(
            event_name = "system.server.notifications_drained",
            correlation_id = "shutdown",
            dispatched,
            "notification dispatcher finished"
        ),
        Ok(Err(error)) => tracing::error!(
            event_name = "system.server.notifications_failed",
            correlation_id = "shutdown",
            error = %error,
            "notification dispatcher panicked"
        ),
        Err(_) => tracing::warn!(
            event_name = "system.server.notifications_abandoned",
            correlation_id = "shutdown",
            grace_secs = app.config.server.graceful_shutdown_secs,
            "notification dispatcher did not finish within the grace period"
        ),
    }
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "failed to listen for shutdown signal"
        );
    }
}
