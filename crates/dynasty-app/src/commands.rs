// Subcommand handlers. Results are printed to stdout; diagnostics go to the
// log file.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use uuid::Uuid;

use dynasty_core::calibration::{
    promote_run, CalibrationEngine, CalibrationRun, CancellationFlag, FoldScore,
};
use dynasty_core::config::{CalibrationConfig, Config, DriftConfig};
use dynasty_core::db::Database;
use dynasty_core::drift::{DriftMonitor, DriftReport};
use dynasty_core::import;
use dynasty_core::model::{PlayerRecord, SettingsFingerprint};
use dynasty_core::store::ValuationStore;
use dynasty_core::valuation::{valuate_player, ParameterRegistry, Valuation};

// ---------------------------------------------------------------------------
// Import and valuation
// ---------------------------------------------------------------------------

pub fn import_players(db: &Database, path: &Path) -> Result<()> {
    let players = import::load_players(path)
        .with_context(|| format!("failed to import {}", path.display()))?;
    let written = db.upsert_players(&players)?;
    let trainable = players.iter().filter(|p| p.is_trainable()).count();
    info!("Imported {} players from {}", written, path.display());
    println!(
        "Imported {written} players ({trainable} usable for calibration) from {}",
        path.display()
    );
    Ok(())
}

pub fn value_players(
    db: &Database,
    registry: &ParameterRegistry,
    config: &Config,
    baseline: bool,
    top: usize,
) -> Result<()> {
    let players = db.load_players()?;
    if players.is_empty() {
        bail!("no players in the database; run `dynasty import` first");
    }
    let active = registry.current();
    let settings = (!baseline).then_some(&config.league.settings);
    let fingerprint = settings.map_or_else(SettingsFingerprint::baseline, |s| s.fingerprint());

    let mut valued: Vec<(&PlayerRecord, Valuation)> = players
        .iter()
        .map(|p| (p, valuate_player(p, &active.parameters, settings)))
        .collect();
    for (player, valuation) in &valued {
        db.upsert_valuation(&player.id, &fingerprint, valuation)?;
    }
    info!(
        "Valued {} players under parameter version {} ({})",
        valued.len(),
        active.version,
        fingerprint
    );

    valued.sort_by(|a, b| b.1.composite_value.total_cmp(&a.1.composite_value));
    println!(
        "Parameter version {} | {}",
        active.version,
        if baseline { "baseline" } else { config.league.name.as_str() }
    );
    println!(
        "{:>4}  {:<26} {:<3} {:>4} {:>8} {:>8} {:>8}",
        "#", "Player", "Pos", "Age", "Now", "Future", "Value"
    );
    for (rank, (player, valuation)) in valued.iter().take(top).enumerate() {
        let scores = valuation.rounded();
        let age = player.age.map_or_else(|| "-".to_string(), |a| a.to_string());
        println!(
            "{:>4}  {:<26} {:<3} {:>4} {:>8} {:>8} {:>8}",
            rank + 1,
            player.name,
            player.position.display_str(),
            age,
            scores.now_score,
            scores.future_score,
            scores.composite_value
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Calibration
// ---------------------------------------------------------------------------

pub async fn calibrate(
    db: Arc<Database>,
    registry: Arc<ParameterRegistry>,
    config: CalibrationConfig,
    promote: bool,
) -> Result<()> {
    let auto_promote = config.auto_promote;
    let cancel = CancellationFlag::new();
    let worker_cancel = cancel.clone();
    let worker_db = Arc::clone(&db);
    let worker_registry = Arc::clone(&registry);

    let mut handle = tokio::task::spawn_blocking(move || {
        let engine = CalibrationEngine::new(worker_db.as_ref(), config);
        let mut report = |score: &FoldScore| -> Result<(), String> {
            println!(
                "  fold {}: train rho {:.4}, holdout rho {:.4} ({} held out)",
                score.fold + 1,
                score.train_spearman,
                score.holdout_spearman,
                score.holdout_size
            );
            Ok(())
        };
        engine.calibrate(&worker_registry, &worker_cancel, &mut report)
    });

    println!("Calibrating from parameter version {}...", registry.current().version);
    let run = tokio::select! {
        joined = &mut handle => joined.context("calibration task failed")?,
        _ = tokio::signal::ctrl_c() => {
            println!("Cancelling after the current fold...");
            cancel.cancel();
            handle.await.context("calibration task failed")?
        }
    };

    print_run(&run);
    if promote && !auto_promote && run.parameters.is_some() {
        let version = promote_run(db.as_ref(), &registry, &run)?;
        println!("Promoted as parameter version {}", version.version);
    } else if auto_promote && registry.current().run_id == Some(run.id) {
        println!("Auto-promoted as parameter version {}", registry.current().version);
    }
    Ok(())
}

pub fn promote(db: &Database, registry: &ParameterRegistry, run_id: Uuid) -> Result<()> {
    let Some(run) = db.load_run(run_id)? else {
        bail!("no calibration run with id {run_id}");
    };
    let version = promote_run(db, registry, &run)?;
    println!(
        "Run {} promoted as parameter version {}",
        run.id, version.version
    );
    Ok(())
}

pub fn activate(db: &Database, registry: &ParameterRegistry, version: u64) -> Result<()> {
    db.activate_version(version)?;
    registry.reactivate(version)?;
    warn!("Parameter version {} reactivated", version);
    println!("Parameter version {version} is active again");
    Ok(())
}

pub fn list_versions(registry: &ParameterRegistry) {
    let current = registry.current().version;
    println!(
        "{:>2} {:>7}  {:>5}  {:<36}  {:<20}",
        "", "Version", "Alpha", "Run", "Promoted"
    );
    for version in registry.history() {
        let marker = if version.version == current { "*" } else { "" };
        let run = version
            .run_id
            .map_or_else(|| "built-in".to_string(), |id| id.to_string());
        println!(
            "{:>2} {:>7}  {:>5.3}  {:<36}  {:<20}",
            marker,
            version.version,
            version.parameters.alpha,
            run,
            version.promoted_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
}

pub fn list_runs(db: &Database, limit: usize) -> Result<()> {
    let runs = db.list_runs(limit)?;
    if runs.is_empty() {
        println!("No calibration runs recorded");
        return Ok(());
    }
    println!(
        "{:<36}  {:<9}  {:>4}  {:>7}  {:<20}",
        "Run", "Status", "Base", "Rho", "Created"
    );
    for run in runs {
        let rho = run
            .metrics
            .as_ref()
            .map_or_else(|| "-".to_string(), |m| format!("{:.4}", m.overall.spearman));
        println!(
            "{:<36}  {:<9}  {:>4}  {:>7}  {:<20}",
            run.id,
            run.status.as_str(),
            run.base_version,
            rho,
            run.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

fn print_run(run: &CalibrationRun) {
    println!("Run {} finished: {}", run.id, run.status);
    if let Some(error) = &run.error {
        println!("  reason: {error}");
    }
    let Some(metrics) = &run.metrics else {
        return;
    };
    println!(
        "  training players: {} | rho {:.4} | MAPE {:.1}%",
        run.training_size, metrics.overall.spearman, metrics.overall.mape
    );
    for entry in &metrics.per_position {
        println!(
            "    {:<3} rho {:.4}  MAPE {:>6.1}%  n={}",
            entry.position.display_str(),
            entry.metrics.spearman,
            entry.metrics.mape,
            entry.metrics.sample_size
        );
    }
    if let Some(params) = &run.parameters {
        println!(
            "  alpha {:.3} | now {:.2}/{:.2} | future {:.2}/{:.2}",
            params.alpha,
            params.weights.market_now,
            params.weights.projection_now,
            params.weights.market_future,
            params.weights.projection_future
        );
    }
    if let Some(shifts) = &run.rank_shifts {
        println!(
            "  significant rank shifts (>= {} places in top {}): {}",
            shifts.threshold,
            shifts.top_n,
            shifts.total_significant()
        );
        for position in &shifts.positions {
            for entry in position.entries.iter().filter(|e| e.significant) {
                println!(
                    "    {:<3} {:<26} {:>3} -> {:>3}",
                    position.position.display_str(),
                    entry.name,
                    entry.before_rank,
                    entry.after_rank
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Drift
// ---------------------------------------------------------------------------

pub fn drift_check(db: &Database, registry: &ParameterRegistry, config: DriftConfig) -> Result<()> {
    let report = DriftMonitor::new(db, config).check(&registry.current())?;
    print_drift_report(&report);
    Ok(())
}

/// Pick up promotions made by other processes since the last tick.
fn sync_active(db: &Database, registry: &ParameterRegistry) -> Result<()> {
    if let Some(active) = db.active_parameters()? {
        if active.version != registry.current().version {
            info!("Active parameters changed to version {}", active.version);
            registry.install(active);
        }
    }
    Ok(())
}

pub async fn monitor(
    db: Arc<Database>,
    registry: Arc<ParameterRegistry>,
    config: DriftConfig,
    interval_secs: u64,
) -> Result<()> {
    let period = Duration::from_secs(interval_secs.max(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!("Drift monitor started, checking every {}s", period.as_secs());
    println!("Monitoring drift every {}s (Ctrl-C to stop)", period.as_secs());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = sync_active(&db, &registry) {
                    error!("Failed to refresh active parameters: {e:#}");
                }
                let worker_db = Arc::clone(&db);
                let active = registry.current();
                let drift = config.clone();
                let result = tokio::task::spawn_blocking(move || {
                    DriftMonitor::new(worker_db.as_ref(), drift).check(&active)
                })
                .await
                .context("drift task failed")?;
                match result {
                    Ok(report) => print_drift_report(&report),
                    Err(e) => error!("Drift check failed: {e}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Drift monitor stopping");
                break;
            }
        }
    }
    Ok(())
}

fn print_drift_report(report: &DriftReport) {
    let m = &report.metrics;
    println!(
        "[{}] version {} | rho {:.4} (n={}) | divergence {:.4} | movers {} ({:.1}% of top {})",
        m.computed_at.format("%Y-%m-%d %H:%M:%S"),
        m.parameter_version,
        m.overall_rho,
        m.sample_size,
        m.divergence,
        m.movers.len(),
        m.mover_fraction * 100.0,
        m.tracked_count
    );
    for p in &m.per_position {
        println!(
            "    {:<3} rho {:.4}  n={}",
            p.position.display_str(),
            p.rho,
            p.sample_size
        );
    }
    for mover in &m.movers {
        println!(
            "    {:<3} {:<26} {:>3} -> {:>3}  ({})",
            mover.position.display_str(),
            mover.name,
            mover.previous_rank,
            mover.current_rank,
            mover.cause
        );
    }
    for alert in &report.alerts {
        println!("  ALERT [{}] {}", alert.severity, alert.message);
    }
}

pub fn list_alerts(db: &Database, include_resolved: bool) -> Result<()> {
    let alerts = db.list_alerts(include_resolved)?;
    if alerts.is_empty() {
        println!("No alerts");
        return Ok(());
    }
    for alert in alerts {
        let state = if alert.resolved { "resolved" } else { "open" };
        println!(
            "{}  {:<8}  {:<8}  {}  {}",
            alert.id,
            alert.severity.as_str(),
            state,
            alert.created_at.format("%Y-%m-%d %H:%M"),
            alert.message
        );
    }
    Ok(())
}

pub fn resolve_alert(db: &Database, id: Uuid) -> Result<()> {
    if db.resolve_alert(id)? {
        println!("Alert {id} resolved");
    } else {
        bail!("no open alert with id {id}");
    }
    Ok(())
}
