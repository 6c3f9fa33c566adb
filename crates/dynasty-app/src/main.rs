// Dynasty valuation entry point.
//
// Startup sequence:
// 1. Parse the command line
// 2. Initialize tracing (log to file, stdout is for command output)
// 3. Load config
// 4. Open database and restore the parameter history
// 5. Dispatch the subcommand

mod cli;
mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use cli::{Cli, Commands};
use dynasty_core::config;
use dynasty_core::db::Database;
use dynasty_core::store::ValuationStore;
use dynasty_core::valuation::ParameterRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Parse the command line
    let cli = Cli::parse();

    // 2. Initialize tracing
    init_tracing()?;
    info!("dynasty starting: {:?}", cli.command);

    // 3. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: league={}, {} teams, {} scoring",
        config.league.name, config.league.settings.num_teams, config.league.settings.scoring
    );

    // 4. Open database and restore the active parameters
    let db = Arc::new(Database::open(&config.db_path).context("failed to open database")?);
    info!("Database opened at {}", config.db_path);
    let registry = Arc::new(ParameterRegistry::with_defaults());
    for version in db.parameter_history()? {
        registry.install(version);
    }
    match db.active_parameters()? {
        Some(active) => {
            info!("Restored parameter version {}", active.version);
            registry.install(active);
        }
        None => info!("No promoted parameters yet, using built-in defaults"),
    }

    // 5. Dispatch
    match cli.command {
        Commands::Import { path } => {
            let path = path.unwrap_or_else(|| PathBuf::from(&config.data_paths.players));
            commands::import_players(&db, &path)?;
        }
        Commands::Value { baseline, top } => {
            commands::value_players(&db, &registry, &config, baseline, top)?;
        }
        Commands::Calibrate { promote } => {
            commands::calibrate(
                Arc::clone(&db),
                Arc::clone(&registry),
                config.calibration.clone(),
                promote,
            )
            .await?;
        }
        Commands::Promote { run_id } => commands::promote(&db, &registry, run_id)?,
        Commands::Activate { version } => commands::activate(&db, &registry, version)?,
        Commands::Versions => commands::list_versions(&registry),
        Commands::Drift => commands::drift_check(&db, &registry, config.drift.clone())?,
        Commands::Monitor { interval_secs } => {
            commands::monitor(
                Arc::clone(&db),
                Arc::clone(&registry),
                config.drift.clone(),
                interval_secs,
            )
            .await?;
        }
        Commands::Runs { limit } => commands::list_runs(&db, limit)?,
        Commands::Alerts { all } => commands::list_alerts(&db, all)?,
        Commands::ResolveAlert { id } => commands::resolve_alert(&db, id)?,
    }

    info!("dynasty finished");
    Ok(())
}

/// Initialize tracing to log to a file (stdout carries command output).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("dynasty.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("dynasty_core=info,dynasty_app=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
