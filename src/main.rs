use anyhow::{Context, Result};
use feedsync::cli::{Args, ExecutionMode, RunConfig};
use feedsync::env;
use feedsync::sync::NoopHandler;
use feedsync::{
    ConfigDiscovery, CoordinatorConfig, LoggingEventHandler, SyncCoordinator, TaskType,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("feedsync=info")),
        )
        .init();

    let args = Args::parse();
    let mode = match args.mode() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    match mode {
        ExecutionMode::Run(config) => run_coordinator(config).await,
        ExecutionMode::ShowConfig { config_override } => show_config(config_override),
        ExecutionMode::InitConfig { path, force } => init_config(&path, force),
    }
}

fn load_config(config_override: Option<&Path>) -> Result<CoordinatorConfig> {
    match config_override {
        Some(path) => {
            info!("Loading configuration override from: {:?}", path);
            CoordinatorConfig::from_toml_file(path)
                .with_context(|| format!("Invalid configuration in {:?}", path))
        }
        None => {
            info!("Discovering default configuration...");
            ConfigDiscovery::discover_config()
        }
    }
}

async fn run_coordinator(run: RunConfig) -> Result<()> {
    let mut config = load_config(run.config_override.as_deref())?;
    if let Some(settings) = run.settings_override {
        config.settings_path = Some(settings);
    }
    if config.settings_path.is_none() {
        let current_dir = std::env::current_dir().context("Failed to resolve working directory")?;
        config.settings_path = Some(env::settings_file_path(&current_dir));
    }
    if let Some(workers) = run.worker_override {
        config.worker_count = Some(workers);
    }

    info!("Starting feedsync coordinator");
    let coordinator = SyncCoordinator::from_config(config).await;
    coordinator.subscribe(Arc::new(LoggingEventHandler));
    for task_type in TaskType::ALL {
        coordinator.register_handler(task_type, Arc::new(NoopHandler));
    }

    coordinator.start().await?;
    if let Some(next) = coordinator.next_sync_scheduled() {
        info!("Next sync scheduled at {}", next);
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested");

    if let Err(e) = coordinator.stop().await {
        error!("Coordinator did not stop cleanly: {}", e);
        return Err(e.into());
    }

    let stats = coordinator.statistics();
    info!(
        "Processed {} task run(s): {} succeeded, {} failed",
        stats.total_sync_cycles, stats.successful_syncs, stats.failed_syncs
    );
    Ok(())
}

fn show_config(config_override: Option<PathBuf>) -> Result<()> {
    if config_override.is_none() {
        ConfigDiscovery::show_discovery_info();
        println!();
    }

    let config = load_config(config_override.as_deref())?;
    println!("Effective configuration:");
    println!("{}", config.to_toml_string()?);
    Ok(())
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if force {
        CoordinatorConfig::default().to_toml_file(path)?;
        println!("Wrote default configuration to {:?}", path);
    } else if ConfigDiscovery::write_default_config(path)? {
        println!("Wrote default configuration to {:?}", path);
    } else {
        println!(
            "Configuration file {:?} already exists, use --force to overwrite",
            path
        );
    }
    Ok(())
}
