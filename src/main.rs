use std::sync::Arc;

use anyhow::Context;

use parley_llm::HttpGenerationBackend;
use parley_server::{AppState, Config};
use parley_store::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting parley server");

    let config = Config::from_env();

    let db = Database::open(&config.database_path).context("failed to open database")?;
    tracing::info!(path = %config.database_path.display(), "Database opened");

    let backend = Arc::new(HttpGenerationBackend::with_timeout(
        config.generation_endpoint.clone(),
        config.generation_api_key.clone(),
        config.generation_timeout,
    ));

    let state = AppState::new(db, backend, &config);

    let handle = parley_server::start(config.http_addr, state)
        .await
        .context("failed to start server")?;

    tracing::info!(port = handle.port, "parley server ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("Shutting down");
    Ok(())
}
