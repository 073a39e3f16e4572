//! leadflow-triage - triage consumer process
//!
//! Run as many instances as needed; they share one consumer group.

use anyhow::{Context, Result};
use clap::Parser;
use leadflow_common::channel::{EventChannel, SqliteEventChannel};
use leadflow_common::classifier::classifier_from_config;
use leadflow_common::config::LeadflowConfig;
use leadflow_common::db::init_database;
use leadflow_common::logging::init_tracing;
use leadflow_triage::{TriageWorker, WorkerSettings};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "leadflow-triage")]
#[command(about = "Lead triage consumer", long_about = None)]
#[command(version)]
struct Args {
    /// Path to TOML config file
    #[arg(short, long, env = "LEADFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite record store path (overrides config file)
    #[arg(short, long, env = "LEADFLOW_DATABASE")]
    database: Option<PathBuf>,

    /// Consumer name within the group (default: worker-<random>)
    #[arg(short = 'n', long, env = "LEADFLOW_CONSUMER_NAME")]
    consumer_name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        LeadflowConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(database) = args.database {
        config.database_path = database;
    }
    if let Some(name) = args.consumer_name {
        config.triage.consumer_name = Some(name);
    }

    init_tracing(&format!(
        "leadflow_triage={level},leadflow_common={level},warn",
        level = config.logging.level
    ));

    info!(
        "Starting Leadflow Triage (leadflow-triage) v{} [{}] built {} ({})",
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
    let classifier = classifier_from_config(config.triage.classifier);
    let settings = WorkerSettings::from_config(&config);
    info!(
        group = %settings.group,
        consumer = %settings.consumer_name,
        max_deliveries = settings.max_deliveries,
        "Worker settings"
    );

    let worker = TriageWorker::new(pool, channel, classifier, settings);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    worker.run(cancel).await.context("Triage worker failed")?;

    info!("Shutdown complete");
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
