//! tq-catalog - TuneQuiz catalog and achievement service
//!
//! Serves catalog mutations, point-in-time counts, rankings and game sessions
//! over HTTP. Reconciliation and retention run when an external scheduler
//! calls their endpoints, or on optional in-process intervals.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tq_catalog::config::CatalogSettings;
use tq_catalog::{build_router, AppState};
use tq_common::config::{RootFolderInitializer, RootFolderResolver};
use tq_common::{SharedClock, SystemClock};

/// Command-line arguments for tq-catalog
#[derive(Parser, Debug)]
#[command(name = "tq-catalog")]
#[command(about = "TuneQuiz catalog, history and achievement service")]
#[command(version)]
struct Args {
    /// Root folder holding the database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "TQ_CATALOG_PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(short, long, env = "TQ_CATALOG_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Root folder resolution: CLI > env > TOML > compiled default
    let resolver = RootFolderResolver::new("catalog").cli_arg(args.root_folder.clone());
    let config = resolver.config().clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level_or_default().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting TuneQuiz Catalog (tq-catalog) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = resolver.resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path();
    info!("Database path: {}", db_path.display());

    let pool = match tq_common::db::init_database(&db_path).await {
        Ok(pool) => {
            info!("Database ready");
            pool
        }
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };

    let settings = CatalogSettings::load(&pool)
        .await
        .context("Failed to load catalog settings")?;

    let clock: SharedClock = Arc::new(SystemClock);
    let state = AppState::new(pool, clock, settings);

    spawn_interval_triggers(&state, config.reconciliation_interval_secs, config.retention_interval_secs);

    let app = build_router(state);

    let bind = args.bind.unwrap_or_else(|| config.bind_address_or_default());
    let port = args.port.unwrap_or_else(|| config.port_or_default());
    let addr: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", bind, port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("tq-catalog listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Start the optional in-process batch timers (0 seconds disables one)
fn spawn_interval_triggers(state: &AppState, reconciliation_secs: u64, retention_secs: u64) {
    if reconciliation_secs > 0 {
        let batch = state.reconciliation.clone();
        info!(interval_secs = reconciliation_secs, "Reconciliation timer enabled");
        tokio::spawn(async move {
            let period = Duration::from_secs(reconciliation_secs);
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if let Err(e) = batch.execute().await {
                    warn!(error = %e, "Scheduled reconciliation failed");
                }
            }
        });
    }

    if retention_secs > 0 {
        let cleaner = state.retention.clone();
        info!(interval_secs = retention_secs, "Retention timer enabled");
        tokio::spawn(async move {
            let period = Duration::from_secs(retention_secs);
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if let Err(e) = cleaner.run().await {
                    warn!(error = %e, "Scheduled retention cleanup failed");
                }
            }
        });
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
