//! ar-metrics - Weekly accounts-receivable metrics service
//!
//! Accepts weekly AR summary uploads as CSV and serves current metrics,
//! week-over-week deltas, trailing averages and historical series.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ar_common::config::{
    database_path, load_default_config, resolve_root_folder, ROOT_FOLDER_ENV,
};
use ar_common::db::{init_database, WeeklyRecordStore};
use ar_metrics::{build_router, AppState};

const DEFAULT_PORT: u16 = 5780;
const DEFAULT_BIND: &str = "127.0.0.1";

/// Command-line arguments for ar-metrics
#[derive(Parser, Debug)]
#[command(name = "ar-metrics")]
#[command(about = "Weekly accounts-receivable metrics service")]
#[command(version)]
struct Args {
    /// Port to listen on [default: 5780]
    #[arg(short, long, env = "AR_METRICS_PORT")]
    port: Option<u16>,

    /// Address to bind [default: 127.0.0.1]
    #[arg(short, long, env = "AR_METRICS_BIND")]
    bind: Option<String>,

    /// Folder holding the metrics database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ar_metrics=info,ar_common=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting AR Metrics (ar-metrics) v{}", env!("CARGO_PKG_VERSION"));

    // CLI > environment > config.toml > platform default
    let config = load_default_config().unwrap_or_default();
    let root_folder = resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV, Some(&config));
    let db_path = database_path(&root_folder);
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .context("Failed to initialize database")?;
    let store = WeeklyRecordStore::new(pool);

    let total = store.count().await.context("Failed to read weekly records")?;
    info!("✓ Database ready ({} weekly records)", total);

    let app = build_router(AppState::new(store));

    let port = args.port.or(config.port).unwrap_or(DEFAULT_PORT);
    let bind = args
        .bind
        .or(config.bind)
        .unwrap_or_else(|| DEFAULT_BIND.to_string());
    let addr: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", bind, port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("ar-metrics listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }
}
