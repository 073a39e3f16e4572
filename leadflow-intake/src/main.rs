//! leadflow-intake - lead submission HTTP service
//!
//! POST /leads with an `Idempotency-Key` header creates a lead exactly once
//! per key and publishes `lead.created` to the event channel.

use anyhow::{Context, Result};
use clap::Parser;
use leadflow_common::channel::{EventChannel, SqliteEventChannel};
use leadflow_common::config::LeadflowConfig;
use leadflow_common::db::init_database;
use leadflow_common::logging::init_tracing;
use leadflow_intake::{build_router, reconcile, AppState, LeadService};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "leadflow-intake")]
#[command(about = "Idempotent lead intake service", long_about = None)]
#[command(version)]
struct Args {
    /// Path to TOML config file
    #[arg(short, long, env = "LEADFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite record store path (overrides config file)
    #[arg(short, long, env = "LEADFLOW_DATABASE")]
    database: Option<PathBuf>,

    /// Address to listen on (overrides config file)
    #[arg(short, long, env = "LEADFLOW_INTAKE_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        LeadflowConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(database) = args.database {
        config.database_path = database;
    }
    if let Some(bind) = args.bind {
        config.intake.bind_addr = bind;
    }

    init_tracing(&format!(
        "leadflow_intake={level},leadflow_common={level},tower_http=info,warn",
        level = config.logging.level
    ));

    info!(
        "Starting Leadflow Intake (leadflow-intake) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Database path: {}", config.database_path.display());

    let pool = init_database(&config.database_path)
        .await
        .context("Failed to initialize record store")?;

    let channel_path = config.channel_database_path();
    let channel = if channel_path == config.database_path {
        SqliteEventChannel::with_pool(pool.clone(), &config.channel).await
    } else {
        info!("Event channel path: {}", channel_path.display());
        SqliteEventChannel::open(&channel_path, &config.channel).await
    }
    .context("Failed to open event channel")?;
    info!(stream = channel.stream(), "Event channel ready");

    let channel: Arc<dyn EventChannel> = Arc::new(channel);
    let service = Arc::new(LeadService::new(pool.clone(), channel));

    let cancel = CancellationToken::new();
    let reconciler = if config.intake.reconcile_interval_secs > 0 {
        Some(tokio::spawn(reconcile::run_reconciliation(
            Arc::clone(&service),
            Duration::from_secs(config.intake.reconcile_interval_secs),
            Duration::from_secs(config.intake.reconcile_grace_secs),
            cancel.clone(),
        )))
    } else {
        warn!("Event reconciliation disabled (reconcile_interval_secs = 0)");
        None
    };

    let app = build_router(AppState::new(service));

    let listener = tokio::net::TcpListener::bind(&config.intake.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.intake.bind_addr))?;
    info!("leadflow-intake listening on http://{}", config.intake.bind_addr);
    info!("Health check: http://{}/health", config.intake.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    cancel.cancel();
    if let Some(handle) = reconciler {
        let _ = handle.await;
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
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
