mod bootstrap;
mod budget;
mod health;
mod routes;

use std::time::Duration;

use anyhow::Result;
use clarifier_core::config::{AppConfig, LoadOptions};

use crate::health::HealthState;

fn init_logging(config: &AppConfig) {
    use clarifier_core::config::LogFormat::*;
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
    // Logging has to be up before bootstrap emits its events.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let sweeper = bootstrap::spawn_sweeper(&app);

    let router = routes::router(app.runner.clone())
        .merge(health::router(HealthState::new(app.runner.clone(), app.db_pool.clone())));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "clarifier.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "clarifier-server listening"
    );

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
    });

    wait_for_shutdown().await;
    let _ = stop_tx.send(());

    // In-flight requests get a bounded window to drain.
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, server).await {
        Ok(joined) => joined??,
        Err(_) => tracing::warn!(
            event_name = "clarifier.server.shutdown_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "in-flight requests did not drain in time"
        ),
    }

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    if let Some(pool) = &app.db_pool {
        pool.close().await;
    }
    tracing::info!(
        event_name = "clarifier.server.stopped",
        correlation_id = "shutdown",
        "clarifier-server stopped"
    );

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "clarifier.server.signal_failed",
            correlation_id = "shutdown",
            error = %error,
            "could not listen for ctrl-c"
        );
        std::future::pending::<()>().await;
    }
    tracing::info!(
        event_name = "clarifier.server.stopping",
        correlation_id = "shutdown",
        "shutdown signal received"
    );
}
