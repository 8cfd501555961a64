//! # Passkey Ceremony Server
//!
//! Entry point: sets up logging, loads configuration, opens the stores and
//! serves the ceremony API.

use passkey_ceremony::config::Config;
use passkey_ceremony::state::AppState;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main application entry point
///
/// 1. Sets up logging
/// 2. Loads configuration from environment variables
/// 3. Opens the stores and builds the orchestrator
/// 4. Starts a background task that sweeps stale challenges
/// 5. Starts the HTTP server
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: info level for most crates, debug level for ours.
    // Can be overridden with RUST_LOG.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,passkey_ceremony=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded: {:?}", config);

    let app_state = AppState::new(&config).await?;
    tracing::info!(
        backend = app_state.orchestrator.stores().backend(),
        "Application state initialized"
    );

    // Abandoned ceremonies leave their challenge behind; consume() already
    // refuses stale ones, this only reclaims the storage.
    let orchestrator = Arc::clone(&app_state.orchestrator);
    let sweep_every = std::time::Duration::from_secs(config.challenge_sweep_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_every);
        loop {
            interval.tick().await;
            let cutoff = chrono::Utc::now() - orchestrator.challenge_ttl();
            match orchestrator.stores().challenges.purge_stale(cutoff).await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "Swept stale challenges"),
                Err(e) => tracing::error!("Challenge sweep failed: {:?}", e),
            }
        }
    });

    let app = passkey_ceremony::router(app_state);

    let bind_addr = config.bind_address();
    tracing::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
