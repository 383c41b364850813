//! orbtrack Binary Entry Point
//!
//! Runs the collector loop against the configured telemetry source and serves
//! the Query API over the same store. Core functionality is provided by the
//! `orbtrack` library crate.

use clap::Parser;
use orbtrack::{
    AnalyticsEngine, CollectorHandle, CollectorLoop, CollectorState, HttpSource,
    config::AppConfig,
    server::{AppState, create_router},
};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// orbtrack - Orbital Telemetry Collector
#[derive(Parser, Debug)]
#[command(name = "orbtrack", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/config.yaml",
        env = "ORBTRACK_CONFIG"
    )]
    config: String,

    /// Server bind address (overrides config file)
    #[arg(long, env = "ORBTRACK_SERVER_BIND")]
    server_bind: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, env = "ORBTRACK_SERVER_PORT")]
    server_port: Option<u16>,

    /// Database file path (overrides config file)
    #[arg(long, env = "ORBTRACK_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Telemetry source URL (overrides config file)
    #[arg(long, env = "ORBTRACK_SOURCE_URL")]
    source_url: Option<String>,

    /// Stop collecting after this many cycles (overrides config file)
    #[arg(long, env = "ORBTRACK_MAX_SAMPLES")]
    max_samples: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,orbtrack=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("orbtrack - Orbital Telemetry Collector");

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration from file
    tracing::info!("Loading configuration from: {}", cli.config);
    let mut config = AppConfig::load(&cli.config)?;

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(bind) = cli.server_bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.server_port {
        config.server.port = port;
    }
    if let Some(path) = cli.db_path {
        config.database.path = path;
    }
    if let Some(url) = cli.source_url {
        config.collector.source_url = url;
    }
    if let Some(max) = cli.max_samples {
        config.collector.max_samples = Some(max);
    }
    config.validate()?;

    tracing::info!(
        "Server: {}:{}, Database: {}, Source: {}",
        config.server.bind,
        config.server.port,
        config.database.path.display(),
        config.collector.source_url,
    );

    // Build storage layer
    let handles = config.database.storage_builder().build().await?;
    let existing = handles.reader.count().await?;
    tracing::info!(samples = existing, "Storage initialized");

    // Start the collector loop
    let source = HttpSource::new(config.collector.source_config())?;
    let collector = CollectorLoop::new(
        source,
        handles.writer.clone(),
        config.collector.loop_config(),
    );
    let collector = CollectorHandle::spawn(collector);

    // A bounded run stops on its own; the API keeps serving what it stored
    let mut monitor = collector.monitor();
    tokio::spawn(async move {
        let status = monitor
            .wait_until(|s| s.state == CollectorState::Stopped)
            .await;
        tracing::info!(
            cycles = status.cycles,
            stored = status.stored,
            "Collector finished; API remains available"
        );
    });

    // Create web server state
    let app_state = AppState {
        reader: handles.reader.clone(),
        analytics: AnalyticsEngine::new(config.analytics.window),
        path: config.path.clone(),
        collector: Some(collector.monitor()),
    };

    // Build Axum router
    let app = create_router(app_state, config.server.static_dir.as_deref());

    // Parse bind address
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;

    tracing::info!("Web server listening on: http://{}", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down collector...");
    if let Err(e) = collector.shutdown().await {
        tracing::error!("Failed to shutdown collector: {}", e);
    }

    tracing::info!("Shutting down storage...");
    if let Err(e) = handles.shutdown().await {
        tracing::error!("Failed to shutdown storage: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
