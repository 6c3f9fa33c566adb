// Persistence seam used by the calibration engine and drift monitor.

use anyhow::Result;
use uuid::Uuid;

use crate::calibration::CalibrationRun;
use crate::drift::{DriftAlert, DriftMetrics, ValuationSnapshot};
use crate::model::{PlayerRecord, SettingsFingerprint};
use crate::valuation::{CalibrationParameters, ParameterVersion, Valuation};

/// Everything the engines read from or write to durable storage.
///
/// Calibration runs are inserted once and then only updated while still
/// pending or running. Drift records are append-only.
pub trait ValuationStore: Send + Sync {
    fn load_players(&self) -> Result<Vec<PlayerRecord>>;

    /// Insert or replace players by id. Returns the number written.
    fn upsert_players(&self, players: &[PlayerRecord]) -> Result<usize>;

    fn upsert_valuation(
        &self,
        player_id: &str,
        fingerprint: &SettingsFingerprint,
        valuation: &Valuation,
    ) -> Result<()>;

    fn insert_run(&self, run: &CalibrationRun) -> Result<()>;

    /// Fails if the stored run is missing or already terminal.
    fn update_run(&self, run: &CalibrationRun) -> Result<()>;

    fn load_run(&self, id: Uuid) -> Result<Option<CalibrationRun>>;

    /// The active parameter version, `None` before anything was promoted.
    fn active_parameters(&self) -> Result<Option<ParameterVersion>>;

    /// Append a new version and make it active in one step.
    fn promote_parameters(
        &self,
        run_id: Option<Uuid>,
        parameters: &CalibrationParameters,
    ) -> Result<ParameterVersion>;

    fn latest_snapshot(&self) -> Result<Option<ValuationSnapshot>>;

    /// Record a snapshot with its metrics and alerts in one step.
    fn append_drift_check(
        &self,
        snapshot: &ValuationSnapshot,
        metrics: &DriftMetrics,
        alerts: &[DriftAlert],
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------

/// Store that delegates to an in-memory [`Database`](crate::db::Database)
/// but fails the reads or writes it is told to.
#[cfg(test)]
pub(crate) struct FailingStore {
    pub inner: crate::db::Database,
    pub fail_load_players: bool,
    pub fail_latest_snapshot: bool,
    pub fail_append_drift_check: bool,
}

#[cfg(test)]
impl FailingStore {
    pub fn new(players: &[PlayerRecord]) -> Self {
        let inner = crate::db::Database::open(":memory:").unwrap();
        inner.upsert_players(players).unwrap();
        Self {
            inner,
            fail_load_players: false,
            fail_latest_snapshot: false,
            fail_append_drift_check: false,
        }
    }
}

#[cfg(test)]
impl ValuationStore for FailingStore {
    fn load_players(&self) -> Result<Vec<PlayerRecord>> {
        if self.fail_load_players {
            anyhow::bail!("players table unavailable");
        }
        self.inner.load_players()
    }

    fn upsert_players(&self, players: &[PlayerRecord]) -> Result<usize> {
        self.inner.upsert_players(players)
    }

    fn upsert_valuation(
        &self,
        player_id: &str,
        fingerprint: &SettingsFingerprint,
        valuation: &Valuation,
    ) -> Result<()> {
        self.inner.upsert_valuation(player_id, fingerprint, valuation)
    }

    fn insert_run(&self, run: &CalibrationRun) -> Result<()> {
        self.inner.insert_run(run)
    }

    fn update_run(&self, run: &CalibrationRun) -> Result<()> {
        self.inner.update_run(run)
    }

    fn load_run(&self, id: Uuid) -> Result<Option<CalibrationRun>> {
        self.inner.load_run(id)
    }

    fn active_parameters(&self) -> Result<Option<ParameterVersion>> {
        self.inner.active_parameters()
    }

    fn promote_parameters(
        &self,
        run_id: Option<Uuid>,
        parameters: &CalibrationParameters,
    ) -> Result<ParameterVersion> {
        self.inner.promote_parameters(run_id, parameters)
    }

    fn latest_snapshot(&self) -> Result<Option<ValuationSnapshot>> {
        if self.fail_latest_snapshot {
            anyhow::bail!("snapshot table unavailable");
        }
        self.inner.latest_snapshot()
    }

    fn append_drift_check(
        &self,
        snapshot: &ValuationSnapshot,
        metrics: &DriftMetrics,
        alerts: &[DriftAlert],
    ) -> Result<()> {
        if self.fail_append_drift_check {
            anyhow::bail!("disk full");
        }
        self.inner.append_drift_check(snapshot, metrics, alerts)
    }
}
