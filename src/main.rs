use anyhow::Result;
use clap::Parser;
use guardcam::api::rest::{AppState, DetectProxy, RestApi};
use guardcam::config;
use guardcam::db::repositories::{AlertStore, MemoryAlertStore, PgAlertStore};
use guardcam::db::DatabaseService;
use guardcam::security::SecurityService;
use guardcam::services::{AlertHistory, EvidenceFiles, EvidenceSink};
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;

/// Evidence sink and alert history server
#[derive(Parser, Debug)]
#[command(name = "guardcam", version)]
struct Args {
    /// Configuration file (.toml or .json)
    #[arg(short, long, env = "GUARDCAM_CONFIG")]
    config: Option<PathBuf>,
}

async fn run_app(args: Args) -> Result<()> {
    let config = config::load_config(args.config.as_deref())?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.api.log_level)).init();
    info!("Starting guardcam evidence server");

    let (store, database): (Arc<dyn AlertStore>, Option<Arc<DatabaseService>>) = if config.database.in_memory {
        warn!("Using in-memory alert store, alerts will not survive a restart");
        (Arc::new(MemoryAlertStore::new()), None)
    } else {
        let database = Arc::new(DatabaseService::new(&config.database).await?);
        (Arc::new(PgAlertStore::new(database.pool.clone())), Some(database))
    };

    let files = EvidenceFiles::from_config(&config.evidence);
    tokio::fs::create_dir_all(files.root()).await?;
    info!("Evidence images stored in {}", files.root().display());

    let state = AppState {
        sink: Arc::new(EvidenceSink::new(store.clone(), files.clone())),
        history: Arc::new(AlertHistory::new(store, files.clone())),
        security: Arc::new(SecurityService::new(config.security.clone())),
        detect: Arc::new(DetectProxy::from_config(&config.api)?),
        database,
    };

    info!("Relaying detection requests to {}", config.api.ai_service_url);

    let http_server = RestApi::new(&config.api, state, files);
    http_server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down...");
        })
        .await?;

    info!("Server stopped");
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run_app(args).await {
        eprintln!("Application error: {:#}", e);
        std::process::exit(1);
    }
}
