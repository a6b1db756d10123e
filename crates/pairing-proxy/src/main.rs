//! Pairing Proxy - Entry point.

use anyhow::Context;
use bridge_client::BridgeClient;
use pairing_proxy::{
    api::{create_router, AppState},
    config::Config,
    registry::SessionRegistry,
    session::SessionManager,
    storage::AuthStore,
    transport::BridgeTransport,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    if config.log.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!("Starting Pairing Proxy");

    if let Err(e) = run(config).await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    // Initialize bridge transport
    let client = BridgeClient::new(&config.bridge.api_url).context("Failed to create bridge client")?;

    if !client.health_check().await {
        warn!(url = %config.bridge.api_url, "Bridge API not reachable yet");
    }

    let transport = BridgeTransport::new(client, config.bridge.poll_interval);

    // Initialize storage
    let store = AuthStore::new(&config.storage.root, &config.storage.credential_file);
    tokio::fs::create_dir_all(store.root())
        .await
        .with_context(|| format!("Failed to create storage root {}", store.root().display()))?;

    let manager = SessionManager::new(
        SessionRegistry::new(),
        store,
        Arc::new(transport),
        config.pairing.clone(),
    );

    let app = create_router(AppState::new(manager));

    // Bind to address
    let addr = SocketAddr::new(
        config.server.listen_addr.parse().unwrap_or([0, 0, 0, 0].into()),
        config.server.port,
    );

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Received shutdown signal");
}
