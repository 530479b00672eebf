use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use roundtable_service::build_router;
use roundtable_service::config::Config;

#[derive(Debug, Parser)]
#[command(name = "roundtable-service", about = "Roundtable workspace API service")]
struct Cli {
    /// Override the bind address from the environment.
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Override the workspace store path.
    #[arg(long)]
    store_path: Option<PathBuf>,

    /// Override the auth store path.
    #[arg(long)]
    auth_store_path: Option<PathBuf>,

    /// Override the tracing filter (e.g. "roundtable=debug,info").
    #[arg(long)]
    log_filter: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env().context("failed to load configuration")?;
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if let Some(store_path) = cli.store_path {
        config.workspace_store_path = Some(store_path);
    }
    if let Some(auth_store_path) = cli.auth_store_path {
        config.auth_store_path = Some(auth_store_path);
    }
    if let Some(log_filter) = cli.log_filter {
        config.log_filter = log_filter;
    }

    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_filter).context("invalid log filter")?)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(
        target: "roundtable.service",
        addr = %config.bind_addr,
        "roundtable service listening",
    );

    let app = build_router(config);
    axum::serve(listener, app)
        .await
        .context("server terminated unexpectedly")?;
    Ok(())
}
