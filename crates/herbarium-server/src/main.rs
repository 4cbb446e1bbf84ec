//! # herbarium-server
//!
//! Serves the herbarium catalogue API. Configuration comes from the
//! environment (and `.env` when present); see [`ServerConfig`].

use tracing::info;
use tracing_subscriber::EnvFilter;

use herbarium_server::seed::ensure_admin;
use herbarium_server::{serve, AppState, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Environment and tracing (respects RUST_LOG)
    // -----------------------------------------------------------------------
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,herbarium_server=debug")),
        )
        .init();

    info!("Starting herbarium server v{}", env!("CARGO_PKG_VERSION"));
    if let Ok(path) = dotenv {
        info!(path = %path.display(), "Loaded .env");
    }

    // -----------------------------------------------------------------------
    // 2. Configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");
    let http_addr = config.http_addr;

    // -----------------------------------------------------------------------
    // 3. Database, media pipeline, default admin
    // -----------------------------------------------------------------------
    let state = AppState::new(config).await?;
    ensure_admin(&state.db, &state.config).await?;

    // -----------------------------------------------------------------------
    // 4. HTTP API (runs until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = serve(state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
