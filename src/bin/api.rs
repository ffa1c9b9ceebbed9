use financial_education_assistant::{agent::Assistant, api::start_server, config::AssistantConfig};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AssistantConfig::from_env()?;

    info!("Financial Education Assistant - API Server");
    info!("Port: {}", config.port);

    let assistant = Arc::new(Assistant::from_config(&config).await?);

    info!("Starting API server...");

    start_server(assistant.clone(), config.port, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown signal received");
    })
    .await?;

    assistant.shutdown().await?;
    Ok(())
}
