// ABOUTME: Entry point for the logsink binary.
// ABOUTME: Parses CLI arguments, initializes tracing, opens the configured store, and starts the HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use logsink_server::{AppState, LogsinkConfig, Persistence, create_router};
use tracing_subscriber::EnvFilter;

/// Log collection service: ingest, query, and delete structured log entries.
#[derive(Debug, Parser)]
#[command(name = "logsink", version)]
struct Cli {
    /// Socket address to bind, overriding LOGSINK_BIND
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Storage backend (`file` or `sqlite`), overriding LOGSINK_PERSISTENCE
    #[arg(long)]
    persistence: Option<Persistence>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is not an error.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("logsink=info,logsink_server=info,logsink_store=info,tower_http=debug")
        }))
        .init();

    let cli = Cli::parse();
    let mut config = LogsinkConfig::from_env()?;
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    if let Some(persistence) = cli.persistence {
        config.persistence = persistence;
    }

    tracing::info!("logsink starting up with {} persistence", config.persistence);

    let store = logsink_store::open_store(&config.store_config())?;
    let state = AppState::new(store).with_read_max_limit(config.read_max_limit);
    let app = create_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("logsink stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
