// Calibration run records and their lifecycle.
//
// pending -> running -> completed | failed | cancelled
//
// Terminal states are immutable: every transition method refuses to move a
// run that has already finished.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::calibration::CalibrationError;
use crate::model::Position;
use crate::valuation::CalibrationParameters;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str_status(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RunStatus::Pending),
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            "cancelled" => Some(RunStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Metrics and reports
// ---------------------------------------------------------------------------

/// Fit quality of a parameter set against a set of market values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitMetrics {
    pub spearman: f64,
    /// Mean absolute percentage error, in percent.
    pub mape: f64,
    pub sample_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionMetrics {
    pub position: Position,
    pub metrics: FitMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationMetrics {
    pub overall: FitMetrics,
    pub per_position: Vec<PositionMetrics>,
}

impl CalibrationMetrics {
    pub fn for_position(&self, position: Position) -> Option<&FitMetrics> {
        self.per_position
            .iter()
            .find(|m| m.position == position)
            .map(|m| &m.metrics)
    }
}

/// Held-out result of one cross-validation fold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoldScore {
    /// Zero-based fold index.
    pub fold: usize,
    pub train_size: usize,
    pub holdout_size: usize,
    pub train_spearman: f64,
    pub holdout_spearman: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankShiftEntry {
    pub player_id: String,
    pub name: String,
    /// Rank by market value (1 = most valuable).
    pub before_rank: usize,
    /// Rank by composite value under the candidate parameters.
    pub after_rank: usize,
    /// `before_rank - after_rank`; positive means the player moved up.
    pub shift: i64,
    pub significant: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRankShift {
    pub position: Position,
    pub entries: Vec<RankShiftEntry>,
    pub significant_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankShiftReport {
    pub top_n: usize,
    pub threshold: usize,
    pub positions: Vec<PositionRankShift>,
}

impl RankShiftReport {
    pub fn total_significant(&self) -> usize {
        self.positions.iter().map(|p| p.significant_count).sum()
    }
}

// ---------------------------------------------------------------------------
// CalibrationRun
// ---------------------------------------------------------------------------

/// One calibration attempt. Parameters, metrics, and the rank-shift report
/// are populated only on completion; `error` only on failure or
/// cancellation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRun {
    pub id: Uuid,
    pub status: RunStatus,
    /// Version of the active parameters the search started from.
    pub base_version: u64,
    pub training_size: usize,
    pub fold_scores: Vec<FoldScore>,
    pub parameters: Option<CalibrationParameters>,
    pub metrics: Option<CalibrationMetrics>,
    pub rank_shifts: Option<RankShiftReport>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl CalibrationRun {
    pub fn new(base_version: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: RunStatus::Pending,
            base_version,
            training_size: 0,
            fold_scores: Vec::new(),
            parameters: None,
            metrics: None,
            rank_shifts: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    fn transition(&mut self, allowed_from: &[RunStatus], to: RunStatus) -> Result<(), CalibrationError> {
        if !allowed_from.contains(&self.status) {
            return Err(CalibrationError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), CalibrationError> {
        self.transition(&[RunStatus::Pending], RunStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(
        &mut self,
        parameters: CalibrationParameters,
        metrics: CalibrationMetrics,
        rank_shifts: RankShiftReport,
    ) -> Result<(), CalibrationError> {
        self.transition(&[RunStatus::Running], RunStatus::Completed)?;
        self.parameters = Some(parameters);
        self.metrics = Some(metrics);
        self.rank_shifts = Some(rank_shifts);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Fail the run. Any parameters already attached are discarded.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), CalibrationError> {
        self.transition(&[RunStatus::Pending, RunStatus::Running], RunStatus::Failed)?;
        self.parameters = None;
        self.metrics = None;
        self.rank_shifts = None;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<(), CalibrationError> {
        self.transition(&[RunStatus::Pending, RunStatus::Running], RunStatus::Cancelled)?;
        self.parameters = None;
        self.metrics = None;
        self.rank_shifts = None;
        self.error = Some(reason.into());
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
