use anyhow::Result;
use clap::Parser;
use guardcam::config;
use guardcam::monitor::{LogStatus, Monitor};
use log::info;
use std::path::PathBuf;
use std::time::Duration;

/// Watches a live source and uploads evidence when inference raises an alert
#[derive(Parser, Debug)]
#[command(name = "guardcam-monitor", version)]
struct Args {
    /// Configuration file (.toml or .json)
    #[arg(short, long, env = "GUARDCAM_CONFIG")]
    config: Option<PathBuf>,

    /// Operator the session runs for, overrides `monitor.user_id`
    #[arg(short, long, env = "GUARDCAM_USER_ID")]
    user_id: Option<i64>,

    /// How long a running alert session may take to finish on shutdown
    #[arg(long, default_value_t = 15)]
    grace_secs: u64,
}

async fn run_app(args: Args) -> Result<()> {
    let mut config = config::load_config(args.config.as_deref())?;
    if let Some(user_id) = args.user_id {
        config.monitor.user_id = user_id;
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.monitor.log_level)).init();
    info!(
        "Starting guardcam monitor for user {} ({:?} source)",
        config.monitor.user_id, config.monitor.source.kind
    );

    let mut monitor = Monitor::from_config(&config.monitor)?;
    monitor.start()?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    let alert_log = monitor.alert_log();
    let stats = monitor.shutdown(Duration::from_secs(args.grace_secs)).await;

    let completed = alert_log
        .entries()
        .iter()
        .filter(|entry| entry.status == LogStatus::Done)
        .count();
    info!(
        "{} alert sessions completed; {} detection polls, {} failed",
        completed, stats.polls, stats.failures
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run_app(args).await {
        eprintln!("Monitor error: {:#}", e);
        std::process::exit(1);
    }
}
