//! leadflow-insights - read-only insight lookup service

use anyhow::{Context, Result};
use clap::Parser;
use leadflow_common::config::LeadflowConfig;
use leadflow_common::db::connect_readonly;
use leadflow_common::logging::init_tracing;
use leadflow_insights::{build_router, AppState};
use std::path::PathBuf;
use tracing::{error, info};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "leadflow-insights")]
#[command(about = "Read-only lead insight lookup", long_about = None)]
#[command(version)]
struct Args {
    /// Path to TOML config file
    #[arg(short, long, env = "LEADFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite record store path (overrides config file)
    #[arg(short, long, env = "LEADFLOW_DATABASE")]
    database: Option<PathBuf>,

    /// Address to listen on (overrides config file)
    #[arg(short, long, env = "LEADFLOW_INSIGHTS_BIND")]
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
        config.insights.bind_addr = bind;
    }

    init_tracing(&format!(
        "leadflow_insights={level},leadflow_common={level},tower_http=info,warn",
        level = config.logging.level
    ));

    info!(
        "Starting Leadflow Insights (leadflow-insights) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Database path: {}", config.database_path.display());

    let pool = match connect_readonly(&config.database_path).await {
        Ok(pool) => {
            info!("Connected to database (read-only)");
            pool
        }
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            return Err(e.into());
        }
    };

    let app = build_router(AppState::new(pool));

    let listener = tokio::net::TcpListener::bind(&config.insights.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.insights.bind_addr))?;
    info!("leadflow-insights listening on http://{}", config.insights.bind_addr);
    info!("Health check: http://{}/health", config.insights.bind_addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
