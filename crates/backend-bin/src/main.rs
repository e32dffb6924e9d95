use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use backend_lib::{
    config::{LogFormat, Settings},
    create_router,
    storage::FlatFileStorage,
    AppState,
};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Real-time meeting gateway and registry
#[derive(Debug, Parser)]
#[command(name = "templemeet", version, about)]
struct Cli {
    /// Path to a TOML config file (defaults to ./config.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind address
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Override the data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));

    match settings.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    if let Some(bind) = cli.bind {
        settings.bind_addr = bind;
    }
    if let Some(data_dir) = cli.data_dir {
        settings.data_dir = data_dir;
    }

    init_tracing(&settings);

    let storage = FlatFileStorage::new(&settings.data_dir)
        .with_context(|| format!("Failed to open data dir {}", settings.data_dir.display()))?;
    let addr = settings.bind_addr;
    let window = Duration::from_secs(settings.rate_limit.window_secs);

    let state = AppState::new(Arc::new(storage), settings);

    // keep the rate limiter table from growing without bound
    let rate_limiter = state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(window);
        loop {
            interval.tick().await;
            rate_limiter.purge_expired();
        }
    });

    let app = create_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "TempleMeet gateway listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}
