// Rookie draft pick valuation.

use crate::model::PickAsset;

/// Value of a current-year first-round pick.
pub const BASE_PICK_VALUE: f64 = 3000.0;

/// Per-year decay applied to picks in future drafts.
pub const YEAR_DISCOUNT: f64 = 0.85;

/// Multipliers for rounds 1-4.
const ROUND_MULTIPLIERS: [f64; 4] = [1.0, 0.45, 0.20, 0.10];

/// Relative value of a round. Round 0 is treated as round 1.
///
/// Past round 4 the round-4 multiplier is divided by the number of rounds
/// beyond it plus one, so the tail stays positive and strictly decreasing
/// for every `u32` round.
pub fn round_multiplier(round: u32) -> f64 {
    let round = round.max(1);
    let last = ROUND_MULTIPLIERS.len() as u32;
    if round <= last {
        return ROUND_MULTIPLIERS[(round - 1) as usize];
    }
    let extra = f64::from(round - last);
    ROUND_MULTIPLIERS[ROUND_MULTIPLIERS.len() - 1] / (1.0 + extra)
}

/// `base * round_multiplier(round) * YEAR_DISCOUNT^(year - current_year)`.
///
/// Past and current-year picks are not discounted. `baseline_value`, when
/// given, replaces [`BASE_PICK_VALUE`].
pub fn pick_value(year: i32, round: u32, current_year: i32, baseline_value: Option<f64>) -> f64 {
    let base = baseline_value.unwrap_or(BASE_PICK_VALUE);
    let years_out = year.saturating_sub(current_year).max(0);
    base * round_multiplier(round) * YEAR_DISCOUNT.powi(years_out)
}

/// [`pick_value`] for a stored pick asset.
pub fn value_pick(pick: &PickAsset, current_year: i32) -> f64 {
    pick_value(pick.year, pick.round, current_year, pick.baseline_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn current_year_first_is_base_value() {
        assert_eq!(pick_value(2026, 1, 2026, None), BASE_PICK_VALUE);
    }

    #[test]
    fn strictly_decreasing_in_round() {
        for year in 2026..2030 {
            let mut previous = f64::INFINITY;
            for round in 1..=8 {
                let v = pick_value(year, round, 2026, None);
                assert!(v < previous, "year {year} round {round}: {v} >= {previous}");
                assert!(v > 0.0);
                previous = v;
            }
        }
    }

    #[test]
    fn strictly_decreasing_in_year() {
        for round in 1..=5 {
            let mut previous = f64::INFINITY;
            for year in 2026..2032 {
                let v = pick_value(year, round, 2026, None);
                assert!(v < previous, "round {round} year {year}");
                previous = v;
            }
        }
    }

    #[test]
    fn past_picks_are_not_inflated() {
        assert_eq!(pick_value(2024, 2, 2026, None), pick_value(2026, 2, 2026, None));
    }

    #[test]
    fn baseline_override() {
        let v = pick_value(2027, 1, 2026, Some(5000.0));
        assert!(approx_eq(v, 5000.0 * YEAR_DISCOUNT, 1e-9));
        let pick = PickAsset {
            year: 2026,
            round: 2,
            baseline_value: Some(1000.0),
        };
        assert!(approx_eq(value_pick(&pick, 2026), 450.0, 1e-9));
    }

    #[test]
    fn round_zero_treated_as_first() {
        assert_eq!(round_multiplier(0), 1.0);
        assert!(approx_eq(round_multiplier(5), 0.05, 1e-12));
    }

    #[test]
    fn very_late_rounds_stay_positive_and_below_earlier_rounds() {
        let first = pick_value(2026, 1, 2026, None);
        let rounds = [1_100, 2_147_483_651, 2_147_483_652, u32::MAX - 1, u32::MAX];
        let mut previous = pick_value(2026, 1_099, 2026, None);
        for round in rounds {
            let v = pick_value(2026, round, 2026, None);
            assert!(v.is_finite() && v > 0.0, "round {round} valued {v}");
            assert!(v < first, "round {round} valued {v} >= first-round {first}");
            assert!(v < previous, "round {round}: {v} >= {previous}");
            previous = v;
        }
    }
}
