// Safety bounds every parameter set must satisfy before it may become
// active. Violations are reported, never clamped.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::Position;
use crate::valuation::CalibrationParameters;

pub const ALPHA_BOUNDS: (f64, f64) = (0.1, 0.9);
pub const WEIGHT_BOUNDS: (f64, f64) = (0.1, 0.9);
pub const SCORING_BOUNDS: (f64, f64) = (0.6, 1.4);

/// RB future value may not rise again past this age.
pub const RB_MONOTONIC_FROM_AGE: u32 = 26;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailViolation {
    pub field: String,
    pub message: String,
}

impl fmt::Display for GuardrailViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn check_range(
    violations: &mut Vec<GuardrailViolation>,
    field: &str,
    value: f64,
    (lo, hi): (f64, f64),
) {
    if !(lo..=hi).contains(&value) {
        violations.push(GuardrailViolation {
            field: field.to_string(),
            message: format!("{value} is outside [{lo}, {hi}]"),
        });
    }
}

/// Check every guardrail and report all violations at once.
pub fn validate_parameters(params: &CalibrationParameters) -> Result<(), Vec<GuardrailViolation>> {
    let mut violations = Vec::new();

    check_range(&mut violations, "alpha", params.alpha, ALPHA_BOUNDS);

    let w = &params.weights;
    for (field, value) in [
        ("weights.market_now", w.market_now),
        ("weights.projection_now", w.projection_now),
        ("weights.market_future", w.market_future),
        ("weights.projection_future", w.projection_future),
    ] {
        check_range(&mut violations, field, value, WEIGHT_BOUNDS);
    }

    let s = &params.scoring;
    for (field, value) in [
        ("scoring.ppr", s.ppr),
        ("scoring.half", s.half),
        ("scoring.standard", s.standard),
    ] {
        check_range(&mut violations, field, value, SCORING_BOUNDS);
    }

    if !params
        .age_curves
        .get(Position::RunningBack)
        .is_non_increasing_from(RB_MONOTONIC_FROM_AGE)
    {
        violations.push(GuardrailViolation {
            field: "age_curves.rb".into(),
            message: format!("must not increase after age {RB_MONOTONIC_FROM_AGE}"),
        });
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}
