// Main entry point for the employee collection endpoint

mod config;
mod file_store;
mod server;
mod store;

use anyhow::Result;
use config::ServerConfig;
use file_store::FileStore;
use store::EmployeeStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting employee collection server...");

    let config = ServerConfig::from_env()?;
    tracing::debug!("Configuration: {:?}", config);

    let seed = if config.seed_fixture {
        store::fixture()
    } else {
        Vec::new()
    };

    // Initialize the collection
    let store = match &config.data_file {
        Some(path) => {
            tracing::info!("Using snapshot file: {}", path.display());
            EmployeeStore::with_snapshot(FileStore::new(path).await?, seed).await?
        }
        None => EmployeeStore::new(seed),
    };

    if !config.response_delay.is_zero() {
        tracing::info!("Simulating {:?} response latency", config.response_delay);
    }

    let state = server::ServerState::new(store, config.response_delay);

    // Start server
    server::create_server(state, config.bind_addr).await?;

    Ok(())
}
