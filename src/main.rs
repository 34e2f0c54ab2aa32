use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tvbox_sync::config::Config;
use tvbox_sync::crawler::pipeline::{PipelineBuilder, RefreshPipeline};
use tvbox_sync::error::{Error, TvboxErrorTrait};
use tvbox_sync::metrics;
use tvbox_sync::scheduler::{RefreshTrigger, TriggerConfig, TriggerEvent};
use tvbox_sync::storage::{CatalogStore, FileCatalogStore};
use tvbox_sync::utils::error::StorageError;

#[derive(Parser)]
#[command(
    name = "tvbox-sync",
    version,
    about = "Aggregate, validate and repair live-stream channel lists",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML config file (environment variables are used when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the refresh pipeline once and exit
    Run {
        /// Print the Prometheus metrics after the run
        #[arg(long, default_value = "false")]
        metrics: bool,
    },

    /// Refresh on the configured interval until interrupted
    Daemon,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics disabled");
    }

    tracing::info!(
        repositories = config.sources.repositories.len(),
        workers = config.checker.workers,
        output_dir = %config.storage.output_dir.display(),
        "tvbox-sync starting"
    );

    match cli.command {
        Commands::Run { metrics } => run(&config, metrics).await,
        Commands::Daemon => daemon(&config).await,
    }
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let default_filter = if verbose {
        "tvbox_sync=debug,info".to_string()
    } else {
        format!("tvbox_sync={level},warn")
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("Failed to initialize tracing")?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("Failed to initialize tracing")?;
        }
    }

    Ok(())
}

/// Pipeline seeded with the last persisted generation
async fn build_pipeline(config: &Config) -> Result<Arc<RefreshPipeline>> {
    let files = FileCatalogStore::from_config(config);

    let store = match files.load().await {
        Ok(catalog) => CatalogStore::new(catalog),
        Err(StorageError::NoCatalog(path)) => {
            tracing::info!(path = %path, "No persisted catalog, starting empty");
            CatalogStore::default()
        }
        Err(e) => {
            let err = Error::from(e);
            tracing::warn!(
                error = %err,
                category = %err.category(),
                "Persisted catalog unreadable, starting empty"
            );
            CatalogStore::default()
        }
    };

    let pipeline = PipelineBuilder::from_config(config)?
        .store(Arc::new(store))
        .persister(Arc::new(files))
        .build()?;

    Ok(Arc::new(pipeline))
}

async fn run(config: &Config, print_metrics: bool) -> Result<()> {
    let pipeline = build_pipeline(config).await?;
    let result = pipeline.run_once().await;

    println!("{}", serde_json::to_string_pretty(&result)?);

    if print_metrics {
        match metrics::gather() {
            Ok(text) => println!("{text}"),
            Err(e) => tracing::warn!(error = %e, "Failed to gather metrics"),
        }
    }

    if let Some(reason) = result.aborted_reason {
        anyhow::bail!("Run aborted: {reason}");
    }
    Ok(())
}

async fn daemon(config: &Config) -> Result<()> {
    let pipeline = build_pipeline(config).await?;
    let trigger = Arc::new(RefreshTrigger::new(
        TriggerConfig::from_config(config)?,
        pipeline,
    )?);

    let mut events = trigger.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let TriggerEvent::RunAborted { result, .. } = event {
                tracing::warn!(
                    reason = result.aborted_reason.as_deref().unwrap_or_default(),
                    "Scheduled run kept the previous catalog"
                );
            }
        }
    });

    let looped = Arc::clone(&trigger);
    let handle = tokio::spawn(async move { looped.start().await });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested, waiting for the current run");

    trigger.stop().await;
    handle.await.context("Scheduler task panicked")??;
    Ok(())
}
