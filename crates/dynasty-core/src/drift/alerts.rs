// Threshold evaluation for drift metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::config::DriftThresholds;
use crate::drift::DriftMetrics;
use crate::model::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }

    pub fn from_str_severity(s: &str) -> Option<Self> {
        match s {
            "warning" => Some(AlertSeverity::Warning),
            "critical" => Some(AlertSeverity::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Correlation,
    Divergence,
    MoverFraction,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Correlation => "correlation",
            AlertKind::Divergence => "divergence",
            AlertKind::MoverFraction => "mover_fraction",
        }
    }

    pub fn from_str_kind(s: &str) -> Option<Self> {
        match s {
            "correlation" => Some(AlertKind::Correlation),
            "divergence" => Some(AlertKind::Divergence),
            "mover_fraction" => Some(AlertKind::MoverFraction),
            _ => None,
        }
    }
}

/// One threshold breach. Created unresolved; resolution happens outside
/// the monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftAlert {
    pub id: Uuid,
    pub metrics_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub severity: AlertSeverity,
    pub kind: AlertKind,
    /// Set for per-position correlation alerts.
    pub position: Option<Position>,
    pub value: f64,
    pub threshold: f64,
    pub message: String,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Breach level for a metric that must stay at or above its thresholds.
fn breach_below(value: f64, warning: f64, critical: f64) -> Option<(AlertSeverity, f64)> {
    if value < critical {
        Some((AlertSeverity::Critical, critical))
    } else if value < warning {
        Some((AlertSeverity::Warning, warning))
    } else {
        None
    }
}

/// Breach level for a metric that must stay at or below its thresholds.
fn breach_above(value: f64, warning: f64, critical: f64) -> Option<(AlertSeverity, f64)> {
    if value > critical {
        Some((AlertSeverity::Critical, critical))
    } else if value > warning {
        Some((AlertSeverity::Warning, warning))
    } else {
        None
    }
}

/// Compare `metrics` against `thresholds`. Every breached metric yields
/// exactly one alert at its most severe level. No lookup of earlier alerts
/// is made.
pub fn evaluate_alerts(
    metrics: &DriftMetrics,
    thresholds: &DriftThresholds,
    min_position_sample: usize,
) -> Vec<DriftAlert> {
    let now = Utc::now();
    let mut alerts = Vec::new();
    let mut push = |severity: AlertSeverity,
                    kind: AlertKind,
                    position: Option<Position>,
                    value: f64,
                    threshold: f64,
                    message: String| {
        alerts.push(DriftAlert {
            id: Uuid::new_v4(),
            metrics_id: metrics.id,
            created_at: now,
            severity,
            kind,
            position,
            value,
            threshold,
            message,
            resolved: false,
            resolved_at: None,
        });
    };

    if let Some((severity, threshold)) = breach_below(
        metrics.overall_rho,
        thresholds.correlation_warning,
        thresholds.correlation_critical,
    ) {
        push(
            severity,
            AlertKind::Correlation,
            None,
            metrics.overall_rho,
            threshold,
            format!(
                "overall rank correlation {:.3} is below {threshold:.2}",
                metrics.overall_rho
            ),
        );
    }

    for pc in &metrics.per_position {
        if pc.sample_size < min_position_sample {
            continue;
        }
        if let Some((severity, threshold)) = breach_below(
            pc.rho,
            thresholds.correlation_warning,
            thresholds.correlation_critical,
        ) {
            push(
                severity,
                AlertKind::Correlation,
                Some(pc.position),
                pc.rho,
                threshold,
                format!(
                    "{} rank correlation {:.3} is below {threshold:.2}",
                    pc.position, pc.rho
                ),
            );
        }
    }

    if let Some((severity, threshold)) = breach_above(
        metrics.divergence,
        thresholds.divergence_warning,
        thresholds.divergence_critical,
    ) {
        push(
            severity,
            AlertKind::Divergence,
            None,
            metrics.divergence,
            threshold,
            format!(
                "positional mix of the top {} diverged by {:.3} (limit {threshold:.2})",
                metrics.tracked_count, metrics.divergence
            ),
        );
    }

    if let Some((severity, threshold)) = breach_above(
        metrics.mover_fraction,
        thresholds.mover_fraction_warning,
        thresholds.mover_fraction_critical,
    ) {
        push(
            severity,
            AlertKind::MoverFraction,
            None,
            metrics.mover_fraction,
            threshold,
            format!(
                "{} of the top {} are rank movers ({:.1}%, limit {:.0}%)",
                metrics.tracked_movers,
                metrics.tracked_count,
                metrics.mover_fraction * 100.0,
                threshold * 100.0
            ),
        );
    }

    alerts
}
