// Calibration engine: fits valuation parameters to observed market values
// with stratified k-fold cross-validation, then gates the result behind
// guardrails before it can be promoted.

pub mod folds;
pub mod guardrails;
pub mod report;
pub mod run;
pub mod search;

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::CalibrationConfig;
use crate::model::PlayerRecord;
use crate::store::ValuationStore;
use crate::valuation::{CalibrationParameters, ParameterRegistry, ParameterVersion};

pub use guardrails::{validate_parameters, GuardrailViolation};
pub use run::{
    CalibrationMetrics, CalibrationRun, FitMetrics, FoldScore, PositionMetrics,
    PositionRankShift, RankShiftEntry, RankShiftReport, RunStatus,
};

use folds::stratified_folds;
use report::{compute_metrics, rank_shift_report};
use search::{rank_fit, SearchConfig};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CalibrationError {
    #[error("not enough training players: {found} usable, {required} required")]
    InsufficientData { found: usize, required: usize },

    #[error("guardrail check failed: {}", join_violations(.0))]
    Guardrail(Vec<GuardrailViolation>),

    #[error("calibration cancelled")]
    Cancelled,

    #[error("fold {} aborted: {reason}", .fold + 1)]
    Aborted { fold: usize, reason: String },

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("calibration panicked: {0}")]
    Panicked(String),

    #[error("cannot move a run from {from} to {to}")]
    InvalidTransition { from: RunStatus, to: RunStatus },

    #[error("run is {0} and has no parameters to promote")]
    NotPromotable(RunStatus),
}

fn join_violations(violations: &[GuardrailViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Shared stop signal, checked at fold boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-fold progress callback. Returning `Err` aborts the run.
pub type FoldObserver<'o> = dyn FnMut(&FoldScore) -> Result<(), String> + 'o;

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

struct FitOutcome {
    parameters: CalibrationParameters,
    metrics: CalibrationMetrics,
    rank_shifts: RankShiftReport,
    fold_scores: Vec<FoldScore>,
    training_size: usize,
}

pub struct CalibrationEngine<'a, S: ValuationStore + ?Sized> {
    store: &'a S,
    config: CalibrationConfig,
}

impl<'a, S: ValuationStore + ?Sized> CalibrationEngine<'a, S> {
    pub fn new(store: &'a S, config: CalibrationConfig) -> Self {
        Self { store, config }
    }

    /// Calibrate from the registry's current version. The result is
    /// promoted only when `auto_promote` is configured and the run
    /// completed.
    pub fn calibrate(
        &self,
        registry: &ParameterRegistry,
        cancel: &CancellationFlag,
        observer: &mut FoldObserver<'_>,
    ) -> CalibrationRun {
        let base = registry.current();
        let run = self.run_with(&base, cancel, observer);
        if self.config.auto_promote && run.status == RunStatus::Completed {
            if let Err(e) = promote_run(self.store, registry, &run) {
                error!("Auto-promotion of run {} failed: {e}", run.id);
            }
        }
        run
    }

    /// Run calibration from `base` without cancellation or progress
    /// reporting.
    pub fn run(&self, base: &ParameterVersion) -> CalibrationRun {
        self.run_with(base, &CancellationFlag::new(), &mut |_| Ok(()))
    }

    /// Run one calibration from `base` and record it.
    ///
    /// Always returns a run in a terminal state. Nothing here changes the
    /// active parameters.
    pub fn run_with(
        &self,
        base: &ParameterVersion,
        cancel: &CancellationFlag,
        observer: &mut FoldObserver<'_>,
    ) -> CalibrationRun {
        let mut run = CalibrationRun::new(base.version);
        if let Err(e) = self.store.insert_run(&run) {
            error!("Failed to record calibration run {}: {e:#}", run.id);
            self.abandon(&mut run, format!("failed to record run: {e:#}"));
            return run;
        }

        if let Err(e) = run.start() {
            error!("Calibration run {} could not start: {e}", run.id);
            return run;
        }
        if let Err(e) = self.store.update_run(&run) {
            error!("Failed to mark calibration run {} running: {e:#}", run.id);
            self.abandon(&mut run, format!("failed to record run start: {e:#}"));
            return run;
        }
        info!(
            "Calibration run {} started from parameter version {}",
            run.id, base.version
        );

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.fit(&base.parameters, cancel, observer)
        }))
        .unwrap_or_else(|payload| Err(CalibrationError::Panicked(panic_message(payload))));

        let mut finished = run.clone();
        let transition = match result {
            Ok(outcome) => {
                finished.training_size = outcome.training_size;
                finished.fold_scores = outcome.fold_scores;
                info!(
                    "Calibration run {} completed: rho={:.3} mape={:.1}% significant_shifts={}",
                    finished.id,
                    outcome.metrics.overall.spearman,
                    outcome.metrics.overall.mape,
                    outcome.rank_shifts.total_significant()
                );
                finished.complete(outcome.parameters, outcome.metrics, outcome.rank_shifts)
            }
            Err(CalibrationError::Cancelled) => {
                info!("Calibration run {} cancelled", finished.id);
                finished.cancel("cancelled at fold boundary")
            }
            Err(e) => {
                error!("Calibration run {} failed: {e}", finished.id);
                finished.fail(e.to_string())
            }
        };
        if let Err(e) = transition {
            error!("Calibration run {} could not finish: {e}", run.id);
            self.abandon(&mut run, e.to_string());
            return run;
        }

        if let Err(e) = self.store.update_run(&finished) {
            error!("Failed to record outcome of calibration run {}: {e:#}", run.id);
            self.abandon(&mut run, format!("failed to record outcome: {e:#}"));
            return run;
        }
        finished
    }

    /// Mark `run` failed and make a best-effort attempt to store that.
    fn abandon(&self, run: &mut CalibrationRun, reason: String) {
        if run.fail(reason).is_err() {
            return;
        }
        if let Err(e) = self.store.update_run(run) {
            warn!("Could not record failure of calibration run {}: {e:#}", run.id);
        }
    }

    fn fit(
        &self,
        base: &CalibrationParameters,
        cancel: &CancellationFlag,
        observer: &mut FoldObserver<'_>,
    ) -> Result<FitOutcome, CalibrationError> {
        let players = self
            .store
            .load_players()
            .map_err(|e| CalibrationError::Storage(format!("{e:#}")))?;
        let training: Vec<PlayerRecord> =
            players.into_iter().filter(|p| p.is_trainable()).collect();

        let k = self.config.folds.max(2);
        let required = self.config.min_training_players.max(k * 2);
        if training.len() < required {
            return Err(CalibrationError::InsufficientData {
                found: training.len(),
                required,
            });
        }

        let search = SearchConfig {
            step: self.config.step,
            max_passes: self.config.max_passes,
            max_drift: self.config.max_drift,
        };
        let folds = stratified_folds(&training, k, self.config.seed);

        let mut fold_scores = Vec::with_capacity(k);
        let mut selected: Option<(f64, CalibrationParameters)> = None;
        for (fold, holdout_idx) in folds.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(CalibrationError::Cancelled);
            }

            let mut in_holdout = vec![false; training.len()];
            for &i in holdout_idx {
                in_holdout[i] = true;
            }
            let mut holdout: Vec<&PlayerRecord> = Vec::with_capacity(holdout_idx.len());
            let mut train: Vec<&PlayerRecord> = Vec::with_capacity(training.len());
            for (i, player) in training.iter().enumerate() {
                if in_holdout[i] {
                    holdout.push(player);
                } else {
                    train.push(player);
                }
            }

            let (candidate, train_spearman) = search::fit(base, &train, &search);
            let holdout_spearman = rank_fit(&candidate, &holdout);
            let score = FoldScore {
                fold,
                train_size: train.len(),
                holdout_size: holdout.len(),
                train_spearman,
                holdout_spearman,
            };
            debug!(
                "Fold {}/{}: train rho={:.4} holdout rho={:.4} ({} held out)",
                fold + 1,
                k,
                train_spearman,
                holdout_spearman,
                holdout.len()
            );
            observer(&score).map_err(|reason| CalibrationError::Aborted { fold, reason })?;
            fold_scores.push(score);

            let better = selected
                .as_ref()
                .map_or(true, |(best, _)| holdout_spearman > *best);
            if better {
                selected = Some((holdout_spearman, candidate));
            }
        }
        if cancel.is_cancelled() {
            return Err(CalibrationError::Cancelled);
        }

        let Some((_, parameters)) = selected else {
            return Err(CalibrationError::InsufficientData {
                found: training.len(),
                required,
            });
        };

        if let Err(violations) = validate_parameters(&parameters) {
            for v in &violations {
                warn!("Guardrail violation: {v}");
            }
            return Err(CalibrationError::Guardrail(violations));
        }

        let refs: Vec<&PlayerRecord> = training.iter().collect();
        let metrics = compute_metrics(&parameters, &refs);
        let rank_shifts = rank_shift_report(
            &parameters,
            &refs,
            self.config.rank_shift_top_n,
            self.config.rank_shift_threshold,
        );

        Ok(FitOutcome {
            parameters,
            metrics,
            rank_shifts,
            fold_scores,
            training_size: training.len(),
        })
    }
}

// ---------------------------------------------------------------------------
// Promotion
// ---------------------------------------------------------------------------

/// Make a completed run's parameters the active set, both in storage and in
/// `registry`. Guardrails are checked again on the way in.
pub fn promote_run<S: ValuationStore + ?Sized>(
    store: &S,
    registry: &ParameterRegistry,
    run: &CalibrationRun,
) -> Result<Arc<ParameterVersion>, CalibrationError> {
    let parameters = match (&run.status, &run.parameters) {
        (RunStatus::Completed, Some(parameters)) => parameters,
        (status, _) => return Err(CalibrationError::NotPromotable(*status)),
    };
    validate_parameters(parameters).map_err(CalibrationError::Guardrail)?;

    let version = store
        .promote_parameters(Some(run.id), parameters)
        .map_err(|e| CalibrationError::Storage(format!("{e:#}")))?;
    info!(
        "Promoted calibration run {} as parameter version {}",
        run.id, version.version
    );
    Ok(registry.install(version))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::model::{PlayerStatus, Position};
    use crate::store::FailingStore;

    /// Market value follows the default valuation closely, with a little
    /// deterministic noise.
    fn pool(n_per_position: usize) -> Vec<PlayerRecord> {
        let mut players = Vec::new();
        for position in Position::ALL {
            for i in 0..n_per_position {
                let proj_now = 320.0 - 5.0 * i as f64;
                let proj_future = 1500.0 - 20.0 * i as f64;
                let noise = ((i * 7 + position.index() * 3) % 5) as f64 * 15.0;
                players.push(PlayerRecord {
                    id: format!("{}{i:02}", position.display_str()),
                    name: format!("{} {i}", position.display_str()),
                    position,
                    age: Some(21 + (i % 4) as u32),
                    status: PlayerStatus::Active,
                    market_value: Some(4.0 * proj_now + proj_future + noise),
                    proj_now: Some(proj_now),
                    proj_future: Some(proj_future),
                });
            }
        }
        players
    }

    fn config() -> CalibrationConfig {
        CalibrationConfig {
            min_training_players: 10,
            ..CalibrationConfig::default()
        }
    }

    fn seeded_db(players: &[PlayerRecord]) -> Database {
        let db = Database::open(":memory:").unwrap();
        db.upsert_players(players).unwrap();
        db
    }

    #[test]
    fn completed_run_has_everything_attached() {
        let db = seeded_db(&pool(15));
        let registry = ParameterRegistry::with_defaults();
        let engine = CalibrationEngine::new(&db, config());
        let run = engine.run(&registry.current());

        assert_eq!(run.status, RunStatus::Completed, "error: {:?}", run.error);
        assert_eq!(run.training_size, 60);
        assert_eq!(run.fold_scores.len(), 5);
        assert!(run.parameters.is_some());
        assert!(run.metrics.is_some());
        assert_eq!(run.rank_shifts.as_ref().unwrap().positions.len(), 4);
        assert_eq!(db.load_run(run.id).unwrap().unwrap().status, RunStatus::Completed);
        // Not promoted automatically.
        assert_eq!(registry.current().version, 0);
        assert!(db.active_parameters().unwrap().is_none());
    }

    #[test]
    fn untrainable_players_are_excluded() {
        let mut players = pool(10);
        for p in players.iter_mut().take(35) {
            p.proj_future = None;
        }
        let db = seeded_db(&players);
        let registry = ParameterRegistry::with_defaults();
        let run = CalibrationEngine::new(&db, config()).run(&registry.current());
        assert_eq!(run.status, RunStatus::Failed);
        let error = run.error.unwrap();
        assert!(error.contains("5 usable"), "{error}");
    }

    #[test]
    fn guardrail_breach_fails_the_run() {
        let db = seeded_db(&pool(15));
        // A base outside the guardrails stays outside: the search cannot
        // drift far enough to rescue it.
        let base = ParameterVersion {
            version: 4,
            run_id: None,
            parameters: CalibrationParameters {
                alpha: 0.05,
                ..CalibrationParameters::default()
            },
            promoted_at: chrono::Utc::now(),
        };
        let cfg = CalibrationConfig {
            max_drift: 0.01,
            ..config()
        };
        let run = CalibrationEngine::new(&db, cfg).run(&base);
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.parameters.is_none());
        assert!(run.error.as_deref().unwrap_or("").contains("alpha"));
        assert_eq!(run.base_version, 4);
    }

    #[test]
    fn cancelled_before_first_fold() {
        let db = seeded_db(&pool(15));
        let registry = ParameterRegistry::with_defaults();
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let run = CalibrationEngine::new(&db, config()).run_with(
            &registry.current(),
            &cancel,
            &mut |_| Ok(()),
        );
        assert_eq!(run.status, RunStatus::Cancelled);
        assert_eq!(db.load_run(run.id).unwrap().unwrap().status, RunStatus::Cancelled);
    }

    #[test]
    fn cancel_mid_run_stops_at_next_fold() {
        let db = seeded_db(&pool(15));
        let registry = ParameterRegistry::with_defaults();
        let cancel = CancellationFlag::new();
        let flag = cancel.clone();
        let mut seen = 0;
        let run = CalibrationEngine::new(&db, config()).run_with(
            &registry.current(),
            &cancel,
            &mut |_| {
                seen += 1;
                if seen == 2 {
                    flag.cancel();
                }
                Ok(())
            },
        );
        assert_eq!(run.status, RunStatus::Cancelled);
        assert_eq!(seen, 2);
    }

    #[test]
    fn observer_panic_is_recorded_as_failure() {
        let db = seeded_db(&pool(15));
        let registry = ParameterRegistry::with_defaults();
        let run = CalibrationEngine::new(&db, config()).run_with(
            &registry.current(),
            &CancellationFlag::new(),
            &mut |score| {
                if score.fold == 1 {
                    panic!("progress sink exploded");
                }
                Ok(())
            },
        );
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error.unwrap().contains("progress sink exploded"));
    }

    #[test]
    fn auto_promote_installs_new_version() {
        let db = seeded_db(&pool(15));
        let registry = ParameterRegistry::with_defaults();
        let cfg = CalibrationConfig {
            auto_promote: true,
            ..config()
        };
        let run = CalibrationEngine::new(&db, cfg).calibrate(
            &registry,
            &CancellationFlag::new(),
            &mut |_| Ok(()),
        );
        assert_eq!(run.status, RunStatus::Completed, "error: {:?}", run.error);
        let current = registry.current();
        assert_eq!(current.version, 1);
        assert_eq!(current.run_id, Some(run.id));
        assert_eq!(db.active_parameters().unwrap().unwrap().version, 1);
    }

    #[test]
    fn unreadable_players_fail_the_run_and_keep_active_parameters() {
        let mut store = FailingStore::new(&pool(15));
        store.fail_load_players = true;
        let active = store
            .promote_parameters(None, &CalibrationParameters::default())
            .unwrap();
        let registry = ParameterRegistry::from_version(active);
        let cfg = CalibrationConfig {
            auto_promote: true,
            ..config()
        };

        let run = CalibrationEngine::new(&store, cfg).calibrate(
            &registry,
            &CancellationFlag::new(),
            &mut |_| Ok(()),
        );
        assert_eq!(run.status, RunStatus::Failed);
        let error = run.error.clone().unwrap();
        assert!(error.contains("storage failure"), "{error}");
        assert!(error.contains("players table unavailable"), "{error}");
        assert!(run.parameters.is_none());
        assert!(run.fold_scores.is_empty());

        let stored = store.load_run(run.id).unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert_eq!(registry.current().version, 1);
        assert_eq!(registry.current().run_id, None);
        let still_active = store.active_parameters().unwrap().unwrap();
        assert_eq!(still_active.version, 1);
        assert_eq!(still_active.run_id, None);
    }

    #[test]
    fn failed_runs_cannot_be_promoted() {
        let registry = ParameterRegistry::with_defaults();
        let db = Database::open(":memory:").unwrap();
        let mut run = CalibrationRun::new(0);
        run.start().unwrap();
        run.fail("boom").unwrap();
        assert_eq!(
            promote_run(&db, &registry, &run).unwrap_err(),
            CalibrationError::NotPromotable(RunStatus::Failed)
        );
        assert_eq!(registry.current().version, 0);
    }
}
