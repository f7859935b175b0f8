//! Coordinator process entrypoint: parses configuration, wires
//! `AppState`, spawns the background workers and serves the HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use cyxcloud_core::CoordinatorConfig;
use cyxcloud_coordinator::state::AppState;
use tokio::signal;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "cyxcloud-coordinator")]
#[command(about = "GFS-style coordinator for a replicated object store")]
struct Cli {
    /// HTTP listen address
    #[arg(long, default_value = "0.0.0.0:8080")]
    http_addr: String,

    /// Directory holding the metadata snapshot (files.json)
    #[arg(long, env = "METADATA_DIR")]
    metadata_dir: Option<String>,

    /// Target replica count per chunk
    #[arg(long, env = "REPLICATION_FACTOR")]
    replication_factor: Option<usize>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level: Level = cli.log_level.parse().unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).with_target(true).init();

    let mut config = CoordinatorConfig::from_env();
    if let Some(dir) = cli.metadata_dir {
        config.metadata_dir = dir;
    }
    if let Some(rf) = cli.replication_factor {
        config.replication_factor = rf;
    }

    info!(
        http = %cli.http_addr,
        metadata_dir = %config.metadata_dir,
        replication_factor = config.replication_factor,
        "starting coordinator"
    );

    let state = Arc::new(AppState::new(config).await?);
    let _workers = state.spawn_background_workers();

    let app = cyxcloud_coordinator::router(state);
    let addr: SocketAddr = cli.http_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("coordinator shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("received SIGTERM, shutting down");
        },
    }
}
