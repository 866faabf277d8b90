use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agentsmart::config::Config;
use agentsmart::feeds::HttpFeedSource;
use agentsmart::reclaim::SystemReclaimer;
use agentsmart::routes::{self, AppState};
use agentsmart::startup;
use agentsmart::store::{AirtableClient, RecordStore};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agentsmart=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match Config::from_environment() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };
    info!(
        "Loaded configuration (port {}, default table {:?})",
        config.port, config.airtable.default_table
    );

    let feeds = Arc::new(HttpFeedSource::new()?);
    let store: Arc<dyn RecordStore> = Arc::new(AirtableClient::new(&config.airtable)?);

    // Create app state
    let state = Arc::new(AppState {
        config: config.clone(),
        feeds,
        store: Some(store),
    });

    let app = routes::router(state);

    // Bind, reclaiming the port from a stale process if needed
    let listener = match startup::start(config.port, &config.startup, &SystemReclaimer).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Startup failed: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(ExitCode::SUCCESS)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
