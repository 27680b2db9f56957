//! Webhook Intake (hms-wi) - Main entry point
//!
//! Receives change notifications from Supabase and Notion and keeps cached
//! evidence and search indexes consistent with the sources.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hms_common::cache::InMemoryEvidenceCache;
use hms_common::config::HmsConfig;
use hms_common::hooks::TracingIndexHook;
use hms_common::MetricsRecorder;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hms_wi::engine::{ChangeProcessor, EngineSettings, RetryEngine};
use hms_wi::intake::{SignatureVerifier, WebhookIntake};
use hms_wi::{build_router, AppState};

/// Command-line arguments for hms-wi
#[derive(Parser, Debug)]
#[command(name = "hms-wi")]
#[command(about = "Webhook intake microservice for HMS")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5741", env = "HMS_WI_PORT")]
    port: u16,

    /// Configuration file (TOML)
    #[arg(short, long, env = "HMS_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Configuration first: it carries the default log level
    let config = HmsConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("hms_wi={0},hms_common={0},tower_http=info", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting HMS Webhook Intake (hms-wi) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let metrics = Arc::new(MetricsRecorder::new());
    let processor = ChangeProcessor::new(
        Arc::new(InMemoryEvidenceCache::new()),
        Arc::new(TracingIndexHook),
        config.webhook.collaborator_timeout(),
    );
    let engine = Arc::new(RetryEngine::start(
        EngineSettings::from_config(&config.webhook),
        Arc::new(processor),
        Arc::clone(&metrics),
    ));

    let signature = match (&config.webhook.signing_secret, config.webhook.verify_signatures) {
        (Some(secret), true) => {
            Some(SignatureVerifier::new(secret).map_err(|e| anyhow::anyhow!("Invalid signing secret: {}", e))?)
        }
        _ => None,
    };
    info!(enabled = signature.is_some(), "Webhook signature verification");

    let intake = Arc::new(WebhookIntake::new(signature, Arc::clone(&engine)));
    let app = build_router(AppState::new(intake, Arc::clone(&engine), metrics));

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

    // Events in backoff are cancelled; in-flight attempts finish
    engine.shutdown().await;

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
