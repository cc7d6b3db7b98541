//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{open_store, OpenAiLegalAssistantAdapter},
    config::Config,
    error::ApiError,
    web::{router, state::AppState},
};
use async_openai::{config::OpenAIConfig, Client};
use lexchile_core::sync::Synchronizer;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Open the Durable Store ---
    let store = open_store(&config.storage).await;

    // --- 3. Hydrate the In-Memory State ---
    let sync = Arc::new(Synchronizer::initialize(store).await);

    // --- 4. Initialize the Assistant Adapter ---
    let mut openai_config = OpenAIConfig::new().with_api_key(config.ai_api_key.clone());
    if let Some(api_base) = &config.ai_api_base {
        openai_config = openai_config.with_api_base(api_base.clone());
    }
    let assistant = Arc::new(OpenAiLegalAssistantAdapter::new(
        Client::with_config(openai_config),
        config.assistant_model.clone(),
    ));

    // --- 5. Build the Shared AppState and Router ---
    let app_state = Arc::new(AppState {
        sync: sync.clone(),
        assistant,
    });
    let app = router(app_state, &config)?;

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- 7. Let Dispatched Writes Land ---
    info!("Waiting for pending writes...");
    sync.flush().await;
    info!("Shutdown complete.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for the shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received.");
}
