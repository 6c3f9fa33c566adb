// Tunable parameters of the composite valuation function.

use serde::{Deserialize, Serialize};

use crate::model::ScoringFormat;
use crate::valuation::curves::AgeCurves;

/// Now/future blend used before any calibration has run.
pub const DEFAULT_ALPHA: f64 = 0.6;

/// Market-vs-projection blend weights for the now and future scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendWeights {
    pub market_now: f64,
    pub projection_now: f64,
    pub market_future: f64,
    pub projection_future: f64,
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self {
            market_now: 0.6,
            projection_now: 0.4,
            market_future: 0.4,
            projection_future: 0.6,
        }
    }
}

/// How much weight projections carry under each scoring format.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringMultipliers {
    pub ppr: f64,
    pub half: f64,
    pub standard: f64,
}

impl ScoringMultipliers {
    pub fn get(&self, format: ScoringFormat) -> f64 {
        match format {
            ScoringFormat::Ppr => self.ppr,
            ScoringFormat::Half => self.half,
            ScoringFormat::Standard => self.standard,
        }
    }
}

impl Default for ScoringMultipliers {
    fn default() -> Self {
        Self {
            ppr: 1.0,
            half: 0.95,
            standard: 0.90,
        }
    }
}

/// The full weight vector. Immutable once produced by a calibration run;
/// new values mean a new parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParameters {
    pub alpha: f64,
    pub weights: BlendWeights,
    pub age_curves: AgeCurves,
    pub scoring: ScoringMultipliers,
}

impl Default for CalibrationParameters {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            weights: BlendWeights::default(),
            age_curves: AgeCurves::default(),
            scoring: ScoringMultipliers::default(),
        }
    }
}
