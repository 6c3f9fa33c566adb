// Asset-level valuation and two-sided bundle comparison.

use serde::{Deserialize, Serialize};

use crate::model::{Asset, LeagueSettings};
use crate::valuation::composite::valuate_player;
use crate::valuation::params::CalibrationParameters;
use crate::valuation::pick::value_pick;

/// Fraction of the larger side within which a trade counts as fair.
pub const FAIRNESS_TOLERANCE: f64 = 0.10;

/// Unrounded composite value of any asset.
pub fn value_asset(
    asset: &Asset,
    params: &CalibrationParameters,
    settings: Option<&LeagueSettings>,
    current_year: i32,
) -> f64 {
    match asset {
        Asset::Player(player) => valuate_player(player, params, settings).composite_value,
        Asset::Pick(pick) => value_pick(pick, current_year),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeVerdict {
    Fair,
    FavorsSideA,
    FavorsSideB,
}

/// Comparison of two asset bundles. Totals are summed unrounded and rounded
/// once at the end.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BundleComparison {
    pub side_a_total: i64,
    pub side_b_total: i64,
    /// `side_a_total - side_b_total` computed on unrounded sums.
    pub difference: i64,
    /// Smaller side divided by larger side, 1.0 when both are empty.
    pub balance: f64,
    pub verdict: TradeVerdict,
}

pub fn compare_bundles(
    side_a: &[Asset],
    side_b: &[Asset],
    params: &CalibrationParameters,
    settings: Option<&LeagueSettings>,
    current_year: i32,
) -> BundleComparison {
    let sum = |side: &[Asset]| -> f64 {
        side.iter()
            .map(|a| value_asset(a, params, settings, current_year))
            .sum()
    };
    let total_a = sum(side_a);
    let total_b = sum(side_b);

    let larger = total_a.max(total_b);
    let balance = if larger <= 0.0 {
        1.0
    } else {
        total_a.min(total_b) / larger
    };

    let verdict = if balance >= 1.0 - FAIRNESS_TOLERANCE {
        TradeVerdict::Fair
    } else if total_a > total_b {
        TradeVerdict::FavorsSideA
    } else {
        TradeVerdict::FavorsSideB
    };

    BundleComparison {
        side_a_total: total_a.round() as i64,
        side_b_total: total_b.round() as i64,
        difference: (total_a - total_b).round() as i64,
        balance,
        verdict,
    }
}
