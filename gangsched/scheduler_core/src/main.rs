use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::Level;

use scheduler_cache::SchedulerCache;
use scheduler_core::{
    init_tracing, LoggingActuator, LoggingSink, Scheduler, SchedulerConfig, TracingConfig,
};
use scheduler_plugins::PluginRegistry;

/// Buffer size for the ingest event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Parser, Debug)]
#[command(name = "gangsched", about = "Gang-scheduling batch workload scheduler")]
struct Cli {
    /// Path to the scheduler configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error.
    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(
        TracingConfig::new("gangsched")
            .with_level(cli.log_level)
            .with_json(cli.json_logs),
    );

    let config = match &cli.config {
        Some(path) => SchedulerConfig::load(path)?,
        None => SchedulerConfig::default(),
    };

    let cache = Arc::new(SchedulerCache::new());
    let scheduler = Scheduler::new(
        cache.clone(),
        PluginRegistry::with_builtins(),
        config,
        Arc::new(LoggingSink),
        Box::new(LoggingActuator),
    )?;

    // The watch-based ingest collaborators feed this channel; the sender
    // half is what they would hold.
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    tracing::info!("scheduler starting");

    let run = tokio::spawn(async move { scheduler.run(event_rx).await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    drop(event_tx);
    run.await?;

    Ok(())
}
