//! Cadence - outreach server entry point

use anyhow::{Context, Result};
use cadence_api::{create_router, AppState};
use cadence_common::config::{Config, LoggingConfig};
use cadence_core::{build_sender, AutomationRunner, AutomationWorker};
use cadence_storage::{DatabasePool, Repositories};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration; an explicit path may be given as the first argument
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&PathBuf::from(path))?,
        None => Config::load()?,
    };
    config.validate()?;

    init_logging(&config.logging);

    info!("Starting Cadence server...");

    // Initialize database
    let db_pool = DatabasePool::connect(&config.database).await?;

    // Run migrations
    db_pool.migrate().await?;

    let repos = Repositories::postgres(db_pool.clone());
    let email_sender = build_sender(&config.outbound)?;
    info!("Outbound provider: {}", email_sender.name());

    // Start automation worker if enabled
    let worker_handle = if config.automation.enabled {
        let runner = Arc::new(AutomationRunner::new(
            repos.clone(),
            email_sender.clone(),
            &config,
        ));
        let worker = AutomationWorker::new(runner)
            .with_poll_interval(config.automation.poll_interval_secs)
            .with_test_mode(config.automation.test_mode);

        Some(tokio::spawn(async move {
            worker.run().await;
        }))
    } else {
        info!("Automation worker disabled");
        None
    };

    // Start API server
    let bind = format!("{}:{}", config.server.bind_address, config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind API server on {}", bind))?;
    let app = create_router(AppState::new(config, repos, email_sender, Some(db_pool)));

    let api_handle = tokio::spawn(async move {
        info!("Starting API server on {}", bind);
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    info!("Cadence server started successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    api_handle.abort();
    if let Some(handle) = worker_handle {
        handle.abort();
    }

    info!("Cadence server shutdown complete");

    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},cadence=debug", logging.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry
            .with(fmt::layer().json().with_target(true).with_level(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
