//! Query Gate (hms-qg) - Main entry point
//!
//! Serves confidence-gated answers over the registered data sources.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hms_common::config::HmsConfig;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hms_qg::catalog::load_catalog;
use hms_qg::gate::QueryGate;
use hms_qg::{build_router, AppState};

/// Command-line arguments for hms-qg
#[derive(Parser, Debug)]
#[command(name = "hms-qg")]
#[command(about = "Confidence-gated query microservice for HMS")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5742", env = "HMS_QG_PORT")]
    port: u16,

    /// Configuration file (TOML)
    #[arg(short, long, env = "HMS_CONFIG")]
    config: Option<PathBuf>,

    /// JSON catalog of static source records
    #[arg(long, env = "HMS_QG_CATALOG")]
    catalog: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = HmsConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("hms_qg={0},hms_common={0},tower_http=info", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting HMS Query Gate (hms-qg) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let mut gate = QueryGate::new(
        config.scoring_weights().context("Invalid scoring weights")?,
        config.source_policy(),
        config.confidence.threshold,
        config.confidence.source_timeout(),
    )
    .context("Invalid confidence threshold")?;

    match &args.catalog {
        Some(path) => {
            let clients = load_catalog(path).with_context(|| format!("Failed to load catalog {}", path.display()))?;
            for client in clients {
                gate = gate.with_client(client);
            }
        }
        None => warn!("No source catalog given; queries will be refused until sources are registered"),
    }
    info!(
        threshold = gate.threshold(),
        sources = gate.registered_sources().len(),
        "Query gate ready"
    );

    let app = build_router(AppState::new(Arc::new(gate)));

    let addr: SocketAddr = format!("{}:{}", config.server.host, args.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, args.port))?;

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

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
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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
