//! acmap-svc - account alias mapping HTTP service
//!
//! Serves mapping CRUD over the configured alias store (SQLite by default,
//! CouchDB or in-memory by configuration).

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info};

use acmap_common::config::{load_config, resolve_config_path};
use acmap_common::open_store;
use acmap_svc::logging::init_tracing;
use acmap_svc::{build_router, AppState};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "acmap-svc")]
#[command(about = "Account alias mapping service")]
#[command(version)]
struct Args {
    /// Path to TOML config file (overrides ACMAP_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:8080
    #[arg(short, long, env = "ACMAP_BIND")]
    bind: Option<String>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, env = "ACMAP_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    init_tracing(level);

    info!(
        "Starting acmap-svc v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match resolve_config_path(args.config.as_deref()) {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: built-in defaults"),
    }

    let store = match open_store(&config.store).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open alias store: {}", e);
            return Err(e.into());
        }
    };

    info!("API resolution policy: {}", config.policy.api);
    let state = AppState::new(store, config.policy.api);
    let app = build_router(state);

    let bind = args.bind.unwrap_or(config.server.bind);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Listening on http://{}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
