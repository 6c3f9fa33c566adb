// Drift monitor: checks whether the active parameters still track the
// market, and records metrics plus any threshold alerts.

pub mod alerts;
pub mod movers;
pub mod snapshot;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::DriftConfig;
use crate::model::Position;
use crate::stats::{jensen_shannon, spearman};
use crate::store::ValuationStore;
use crate::valuation::ParameterVersion;

pub use alerts::{evaluate_alerts, AlertKind, AlertSeverity, DriftAlert};
pub use movers::{find_movers, DriftCause, Mover};
pub use snapshot::{SnapshotEntry, ValuationSnapshot};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DriftError {
    #[error("no players with market values to compare against")]
    EmptySnapshot,

    #[error("storage failure during drift check: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionCorrelation {
    pub position: Position,
    pub rho: f64,
    pub sample_size: usize,
}

/// One drift check. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftMetrics {
    pub id: Uuid,
    pub snapshot_id: Uuid,
    /// `None` on the very first check, when there is nothing to compare to.
    pub prior_snapshot_id: Option<Uuid>,
    pub parameter_version: u64,
    pub computed_at: DateTime<Utc>,
    /// Spearman rho between composite and market value across all players.
    pub overall_rho: f64,
    pub sample_size: usize,
    pub per_position: Vec<PositionCorrelation>,
    /// Jensen-Shannon divergence of the positional mix of the top set.
    pub divergence: f64,
    pub movers: Vec<Mover>,
    /// Size of the top set used for divergence and mover fraction.
    pub tracked_count: usize,
    /// Movers that are in the current top set.
    pub tracked_movers: usize,
    pub mover_fraction: f64,
}

/// Compare `current` against `prior` (if any). Pure; nothing is stored.
pub fn compute_drift(
    current: &ValuationSnapshot,
    prior: Option<&ValuationSnapshot>,
    config: &DriftConfig,
) -> DriftMetrics {
    let (composite, market): (Vec<f64>, Vec<f64>) = current
        .entries
        .iter()
        .map(|e| (e.composite_value, e.market_value))
        .unzip();
    let overall_rho = spearman(&composite, &market);

    let per_position = Position::ALL
        .iter()
        .map(|&position| {
            let (c, m): (Vec<f64>, Vec<f64>) = current
                .entries_for(position)
                .map(|e| (e.composite_value, e.market_value))
                .unzip();
            PositionCorrelation {
                position,
                rho: spearman(&c, &m),
                sample_size: c.len(),
            }
        })
        .collect();

    let top = current.top_by_composite(config.top_n);
    let tracked_count = top.len();

    let (divergence, movers, tracked_movers) = match prior {
        Some(prior) => {
            let divergence = jensen_shannon(
                &current.position_distribution(config.top_n),
                &prior.position_distribution(config.top_n),
            );
            let movers = find_movers(prior, current, config.mover_rank_threshold);
            let top_ids: HashSet<&str> = top.iter().map(|e| e.player_id.as_str()).collect();
            let tracked_movers = movers
                .iter()
                .filter(|m| top_ids.contains(m.player_id.as_str()))
                .count();
            (divergence, movers, tracked_movers)
        }
        None => (0.0, Vec::new(), 0),
    };

    let mover_fraction = if tracked_count == 0 {
        0.0
    } else {
        tracked_movers as f64 / tracked_count as f64
    };

    DriftMetrics {
        id: Uuid::new_v4(),
        snapshot_id: current.id,
        prior_snapshot_id: prior.map(|p| p.id),
        parameter_version: current.parameter_version,
        computed_at: Utc::now(),
        overall_rho,
        sample_size: current.entries.len(),
        per_position,
        divergence,
        movers,
        tracked_count,
        tracked_movers,
        mover_fraction,
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

/// Result of one recorded drift check.
#[derive(Debug, Clone)]
pub struct DriftReport {
    pub snapshot: ValuationSnapshot,
    pub metrics: DriftMetrics,
    pub alerts: Vec<DriftAlert>,
}

pub struct DriftMonitor<'a, S: ValuationStore + ?Sized> {
    store: &'a S,
    config: DriftConfig,
}

impl<'a, S: ValuationStore + ?Sized> DriftMonitor<'a, S> {
    pub fn new(store: &'a S, config: DriftConfig) -> Self {
        Self { store, config }
    }

    /// Snapshot the live pool under `active`, compare it to the last stored
    /// snapshot, and append the snapshot, metrics, and alerts.
    ///
    /// Storage is read once up front and written once at the end. A failed
    /// check writes nothing.
    pub fn check(&self, active: &ParameterVersion) -> Result<DriftReport, DriftError> {
        let players = self
            .store
            .load_players()
            .map_err(|e| DriftError::Storage(format!("{e:#}")))?;
        let prior = self
            .store
            .latest_snapshot()
            .map_err(|e| DriftError::Storage(format!("{e:#}")))?;

        let snapshot = ValuationSnapshot::capture(&players, active);
        if snapshot.is_empty() {
            warn!("Drift check skipped: no players with market values");
            return Err(DriftError::EmptySnapshot);
        }

        let metrics = compute_drift(&snapshot, prior.as_ref(), &self.config);
        let alerts = evaluate_alerts(
            &metrics,
            &self.config.thresholds,
            self.config.min_position_sample,
        );

        info!(
            "Drift check {}: rho={:.3} divergence={:.3} movers={} ({:.1}% of top {})",
            metrics.id,
            metrics.overall_rho,
            metrics.divergence,
            metrics.movers.len(),
            metrics.mover_fraction * 100.0,
            metrics.tracked_count
        );
        for alert in &alerts {
            warn!("Drift alert [{}] {}", alert.severity, alert.message);
        }

        self.store
            .append_drift_check(&snapshot, &metrics, &alerts)
            .map_err(|e| DriftError::Storage(format!("{e:#}")))?;

        Ok(DriftReport {
            snapshot,
            metrics,
            alerts,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::model::{PlayerRecord, PlayerStatus};
    use crate::store::FailingStore;
    use crate::valuation::ParameterRegistry;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    /// Ten players per position, market falling with index.
    fn pool() -> Vec<PlayerRecord> {
        Position::ALL
            .iter()
            .flat_map(|&position| {
                (0..10).map(move |i| PlayerRecord {
                    id: format!("{}{i}", position.display_str()),
                    name: format!("{} {i}", position.display_str()),
                    position,
                    age: Some(26),
                    status: PlayerStatus::Active,
                    market_value: Some(5000.0 - 400.0 * i as f64),
                    proj_now: Some(300.0 - 20.0 * i as f64),
                    proj_future: Some(1200.0 - 80.0 * i as f64),
                })
            })
            .collect()
    }

    #[test]
    fn first_check_has_no_divergence_or_movers() {
        let registry = ParameterRegistry::with_defaults();
        let snap = ValuationSnapshot::capture(&pool(), &registry.current());
        let metrics = compute_drift(&snap, None, &DriftConfig::default());
        // Equal market values across positions tie; age curves split them.
        assert!(metrics.overall_rho > 0.95, "rho {}", metrics.overall_rho);
        assert_eq!(metrics.divergence, 0.0);
        assert!(metrics.movers.is_empty());
        assert_eq!(metrics.tracked_count, 40);
        assert!(metrics.prior_snapshot_id.is_none());
        for pc in &metrics.per_position {
            assert_eq!(pc.sample_size, 10);
            assert!(approx_eq(pc.rho, 1.0, 1e-12));
        }
    }

    #[test]
    fn unchanged_pool_shows_no_drift() {
        let registry = ParameterRegistry::with_defaults();
        let a = ValuationSnapshot::capture(&pool(), &registry.current());
        let b = ValuationSnapshot::capture(&pool(), &registry.current());
        let metrics = compute_drift(&b, Some(&a), &DriftConfig::default());
        assert!(approx_eq(metrics.divergence, 0.0, 1e-12));
        assert!(metrics.movers.is_empty());
        assert_eq!(metrics.mover_fraction, 0.0);
        assert_eq!(metrics.prior_snapshot_id, Some(a.id));
    }

    #[test]
    fn monitor_persists_and_chains_snapshots() {
        let db = Database::open(":memory:").unwrap();
        db.upsert_players(&pool()).unwrap();
        let registry = ParameterRegistry::with_defaults();
        let monitor = DriftMonitor::new(&db, DriftConfig::default());

        let first = monitor.check(&registry.current()).unwrap();
        assert!(first.metrics.prior_snapshot_id.is_none());
        assert!(first.alerts.is_empty());

        let second = monitor.check(&registry.current()).unwrap();
        assert_eq!(second.metrics.prior_snapshot_id, Some(first.snapshot.id));
        assert_eq!(db.list_drift_metrics(10).unwrap().len(), 2);
    }

    #[test]
    fn empty_pool_is_an_error() {
        let db = Database::open(":memory:").unwrap();
        let registry = ParameterRegistry::with_defaults();
        let monitor = DriftMonitor::new(&db, DriftConfig::default());
        assert!(matches!(
            monitor.check(&registry.current()),
            Err(DriftError::EmptySnapshot)
        ));
        assert!(db.latest_snapshot().unwrap().is_none());
    }

    #[test]
    fn failed_append_reports_storage_error_and_writes_nothing() {
        let mut store = FailingStore::new(&pool());
        store.fail_append_drift_check = true;
        let registry = ParameterRegistry::with_defaults();
        let monitor = DriftMonitor::new(&store, DriftConfig::default());

        match monitor.check(&registry.current()) {
            Err(DriftError::Storage(message)) => assert!(message.contains("disk full"), "{message}"),
            other => panic!("expected storage error, got {other:?}"),
        }
        assert!(store.inner.latest_snapshot().unwrap().is_none());
        assert!(store.inner.list_drift_metrics(10).unwrap().is_empty());
        assert!(store.inner.list_alerts(true).unwrap().is_empty());
    }

    #[test]
    fn unreadable_history_stops_the_check_before_writing() {
        let mut store = FailingStore::new(&pool());
        store.fail_latest_snapshot = true;
        let registry = ParameterRegistry::with_defaults();
        let monitor = DriftMonitor::new(&store, DriftConfig::default());

        assert!(matches!(
            monitor.check(&registry.current()),
            Err(DriftError::Storage(_))
        ));
        assert!(store.inner.list_drift_metrics(10).unwrap().is_empty());
    }
}
