//! Main Entrypoint for the Talk To Book API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing the shared clients (upstream HTTP and the vision model).
//! 3. Constructing the Axum router and applying middleware.
//! 4. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use std::{net::SocketAddr, sync::Arc};
use talkbook_api::{config::Config, router::create_router, state::AppState, upstream::Upstream};
use talkbook_core::{provider::Provider, vision::OpenAIVisionClient};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    for provider in [Provider::OpenAI, Provider::Outspeed] {
        if config.api_key(provider).is_none() {
            warn!(
                "{} is not set; {} requests must supply their own key",
                provider.api_key_var(),
                provider
            );
        }
    }

    // --- 3. Initialize Shared Clients ---
    let openai_config = OpenAIConfig::new()
        .with_api_key(config.api_key(Provider::OpenAI).unwrap_or_default())
        .with_api_base(config.api_base(Provider::OpenAI));
    let vision = Arc::new(OpenAIVisionClient::new(
        openai_config,
        config.transcribe_model.clone(),
    ));

    let app_state = Arc::new(AppState {
        config: Arc::new(config.clone()),
        upstream: Upstream::new(reqwest::Client::new()),
        vision,
    });

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 5. Start Server ---
    info!(
        transcribe_model = %config.transcribe_model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
