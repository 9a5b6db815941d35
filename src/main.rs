//! Entry point for the go-term MCP server.
//!
//! Loads configuration (file + env + CLI flags), initializes tracing to
//! stderr (stdout is reserved for MCP JSON-RPC), opens the History Store,
//! starts the Session Registry's inactivity sweeper, and serves on stdio
//! until the client disconnects or the process is signaled.

use anyhow::Result;
use clap::Parser;
use go_term::config::{Cli, Config};
use go_term::history::HistoryStore;
use go_term::registry::SessionRegistry;
use go_term::server::GoTermServer;
use rmcp::{ServiceExt, transport::stdio};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("starting go-term MCP server v{}", env!("CARGO_PKG_VERSION"));

    let history = HistoryStore::open(&config.db_path(), config.enable_wal).await?;

    let registry = Arc::new(SessionRegistry::new(
        config.max_sessions,
        Duration::from_secs(config.session_timeout_secs),
        config.default_working_dir.clone(),
    ));
    registry.spawn_sweeper(Duration::from_secs(config.cleanup_interval_secs));

    let server = GoTermServer::new(registry.clone(), history.clone(), config);
    let service = server.serve(stdio()).await.inspect_err(|e| {
        tracing::error!("serving error: {:?}", e);
    })?;

    service.waiting().await?;

    registry.shutdown().await;
    history.close().await;
    tracing::info!("go-term server shut down");
    Ok(())
}
