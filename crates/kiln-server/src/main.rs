//! kiln server entry point.
//!
//! Loads configuration from the environment (and `.env`), builds the
//! language registry and sandbox, and serves the HTTP API until Ctrl-C.

use kiln_core::Sandbox;
use kiln_server::{http, AppState, ServerConfig, TracingLog};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive("kiln_server=info".parse()?)
                .add_directive("kiln_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting kiln server");
    if let Ok(path) = dotenv {
        tracing::info!(path = %path.display(), "Loaded environment file");
    }

    let config = ServerConfig::from_env();
    tracing::info!(?config, "Configuration loaded");
    config.validate()?;

    let registry = Arc::new(config.load_registry()?);
    let sandbox = Sandbox::with_registry(config.sandbox_config()?, registry)?;
    let state = AppState::new(sandbox, Arc::new(TracingLog));
    tracing::info!(
        languages = state.languages().len(),
        available = state.languages().iter().filter(|l| l.available).count(),
        planned = state.sandbox().registry().planned().len(),
        "Language registry ready"
    );

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    let http_addr = config.http_addr;
    let body_limit = config.max_body_bytes;

    let http_handle = tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.recv().await;
        };
        if let Err(e) = http::serve(state, http_addr, body_limit, shutdown).await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });
    tracing::info!(http_addr = %config.http_addr, "Server ready");

    signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, draining in-flight requests...");

    let _ = shutdown_tx.send(());
    let _ = http_handle.await;

    tracing::info!("Server shutdown complete");
    Ok(())
}
