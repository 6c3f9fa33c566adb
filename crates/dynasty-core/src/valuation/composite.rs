// Composite valuation: market value + projections + age/risk + settings.
//
// Pure and infallible. Missing inputs degrade to neutral defaults so the
// function stays usable inline while a trade is being built.

use serde::{Deserialize, Serialize};

use crate::model::{LeagueSettings, PlayerRecord, PlayerStatus, Position};
use crate::valuation::adjustments::{compute_settings_adjustments_with, SettingsAdjustments};
use crate::valuation::curves::risk_multiplier;
use crate::valuation::params::CalibrationParameters;

/// Inputs for a single player valuation. `None` numeric inputs are treated
/// as 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValuationInput {
    pub market_value: Option<f64>,
    pub proj_now: Option<f64>,
    pub proj_future: Option<f64>,
    pub position: Position,
    pub age: Option<u32>,
    pub status: PlayerStatus,
}

impl From<&PlayerRecord> for ValuationInput {
    fn from(player: &PlayerRecord) -> Self {
        Self {
            market_value: player.market_value,
            proj_now: player.proj_now,
            proj_future: player.proj_future,
            position: player.position,
            age: player.age,
            status: player.status,
        }
    }
}

/// Output of the composite valuation for one asset under one settings
/// fingerprint. Scores are unrounded; use [`Valuation::rounded`] for display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
    pub now_score: f64,
    pub future_score: f64,
    pub composite_value: f64,
    /// The alpha used to blend now and future scores.
    pub alpha: f64,
    pub age_adjustment: f64,
    pub risk_adjustment: f64,
    /// Present only when the valuation was computed with league settings.
    pub settings_adjustments: Option<SettingsAdjustments>,
}

/// Integer scores for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundedScores {
    pub now_score: i64,
    pub future_score: i64,
    pub composite_value: i64,
}

impl Valuation {
    /// Round each score independently. Aggregates across assets should sum
    /// the unrounded fields first and round the total.
    pub fn rounded(&self) -> RoundedScores {
        RoundedScores {
            now_score: self.now_score.round() as i64,
            future_score: self.future_score.round() as i64,
            composite_value: self.composite_value.round() as i64,
        }
    }
}

/// Compute now, future, and composite scores.
///
/// Without settings:
///   now    = wM_now * market + wP_now * proj_now
///   future = (wM_future * market + wP_future * proj_future) * age * risk
///
/// With settings, projection components are scaled by the scoring factor
/// before combining with the market component, and both scores are then
/// scaled by the combined settings multiplier.
///
/// composite = alpha * now + (1 - alpha) * future
pub fn valuate(
    input: &ValuationInput,
    params: &CalibrationParameters,
    settings: Option<&LeagueSettings>,
) -> Valuation {
    let market = input.market_value.unwrap_or(0.0);
    let proj_now = input.proj_now.unwrap_or(0.0);
    let proj_future = input.proj_future.unwrap_or(0.0);
    let w = &params.weights;

    let age_adjustment = params.age_curves.multiplier(input.position, input.age);
    let risk_adjustment = risk_multiplier(input.status);

    let (now_score, future_score, settings_adjustments) = match settings {
        None => {
            let now = w.market_now * market + w.projection_now * proj_now;
            let future_base = w.market_future * market + w.projection_future * proj_future;
            (now, future_base * age_adjustment * risk_adjustment, None)
        }
        Some(settings) => {
            let adj = compute_settings_adjustments_with(input.position, settings, &params.scoring);
            let now = (w.market_now * market + w.projection_now * proj_now * adj.scoring_factor)
                * adj.combined_multiplier;
            let future_base = w.market_future * market
                + w.projection_future * proj_future * adj.scoring_factor;
            let future =
                future_base * age_adjustment * risk_adjustment * adj.combined_multiplier;
            (now, future, Some(adj))
        }
    };

    let alpha = params.alpha;
    Valuation {
        now_score,
        future_score,
        composite_value: alpha * now_score + (1.0 - alpha) * future_score,
        alpha,
        age_adjustment,
        risk_adjustment,
        settings_adjustments,
    }
}

/// Convenience wrapper over [`valuate`] for a stored player record.
pub fn valuate_player(
    player: &PlayerRecord,
    params: &CalibrationParameters,
    settings: Option<&LeagueSettings>,
) -> Valuation {
    valuate(&ValuationInput::from(player), params, settings)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ScoringFormat, StartingLineup};

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    fn rb_input() -> ValuationInput {
        ValuationInput {
            market_value: Some(1000.0),
            proj_now: Some(800.0),
            proj_future: Some(600.0),
            position: Position::RunningBack,
            age: Some(25),
            status: PlayerStatus::Active,
        }
    }

    #[test]
    fn worked_example_without_settings() {
        let v = valuate(&rb_input(), &CalibrationParameters::default(), None);
        assert!(approx_eq(v.now_score, 920.0, 1e-9));
        assert!(approx_eq(v.future_score, 760.0, 1e-9));
        assert!(approx_eq(v.composite_value, 856.0, 1e-9));
        assert_eq!(v.age_adjustment, 1.0);
        assert_eq!(v.risk_adjustment, 1.0);
        assert!(v.settings_adjustments.is_none());
        assert_eq!(
            v.rounded(),
            RoundedScores {
                now_score: 920,
                future_score: 760,
                composite_value: 856
            }
        );
    }

    #[test]
    fn missing_projections_count_as_zero() {
        let input = ValuationInput {
            proj_now: None,
            proj_future: None,
            ..rb_input()
        };
        let v = valuate(&input, &CalibrationParameters::default(), None);
        assert!(approx_eq(v.now_score, 600.0, 1e-9));
        assert!(approx_eq(v.future_score, 400.0, 1e-9));
    }

    #[test]
    fn all_inputs_missing_values_to_zero() {
        let input = ValuationInput {
            market_value: None,
            proj_now: None,
            proj_future: None,
            position: Position::TightEnd,
            age: None,
            status: PlayerStatus::Unknown,
        };
        let v = valuate(&input, &CalibrationParameters::default(), None);
        assert_eq!(v.composite_value, 0.0);
        assert_eq!(v.age_adjustment, 1.0);
        assert_eq!(v.risk_adjustment, 1.0);
    }

    #[test]
    fn retired_player_has_no_future_value() {
        let input = ValuationInput {
            status: PlayerStatus::Retired,
            ..rb_input()
        };
        let v = valuate(&input, &CalibrationParameters::default(), None);
        assert_eq!(v.future_score, 0.0);
        assert!(approx_eq(v.composite_value, 0.6 * 920.0, 1e-9));
    }

    #[test]
    fn now_score_ignores_age_and_risk() {
        let old_hurt = ValuationInput {
            age: Some(31),
            status: PlayerStatus::InjuredReserve,
            ..rb_input()
        };
        let young = valuate(&rb_input(), &CalibrationParameters::default(), None);
        let old = valuate(&old_hurt, &CalibrationParameters::default(), None);
        assert_eq!(young.now_score, old.now_score);
        assert!(old.future_score < young.future_score);
    }

    #[test]
    fn composite_matches_blend_for_every_combination() {
        let params = CalibrationParameters::default();
        let statuses = [
            PlayerStatus::Active,
            PlayerStatus::Questionable,
            PlayerStatus::Doubtful,
            PlayerStatus::Out,
            PlayerStatus::InjuredReserve,
            PlayerStatus::Suspended,
            PlayerStatus::Retired,
            PlayerStatus::Unknown,
        ];
        let ages: Vec<Option<u32>> = std::iter::once(None).chain((0..=50).map(Some)).collect();
        for pos in Position::ALL {
            for status in statuses {
                for &age in &ages {
                    let input = ValuationInput {
                        market_value: Some(4321.0),
                        proj_now: Some(210.5),
                        proj_future: Some(1800.0),
                        position: pos,
                        age,
                        status,
                    };
                    let v = valuate(&input, &params, None);
                    let expected = (params.alpha * v.now_score
                        + (1.0 - params.alpha) * v.future_score)
                        .round() as i64;
                    assert!(
                        (v.rounded().composite_value - expected).abs() <= 1,
                        "{pos} {status} {age:?}"
                    );
                    assert!(v.composite_value >= 0.0);
                }
            }
        }
    }

    #[test]
    fn baseline_settings_match_no_settings_under_ppr() {
        // 12-team 1QB PPR with default scoring factors is neutral.
        let params = CalibrationParameters::default();
        let settings = LeagueSettings::default();
        let without = valuate(&rb_input(), &params, None);
        let with = valuate(&rb_input(), &params, Some(&settings));
        assert!(approx_eq(without.composite_value, with.composite_value, 1e-9));
        assert!(with.settings_adjustments.is_some());
    }

    #[test]
    fn scoring_factor_scales_only_projections() {
        let params = CalibrationParameters::default();
        let settings = LeagueSettings {
            scoring: ScoringFormat::Standard,
            ..LeagueSettings::default()
        };
        let v = valuate(&rb_input(), &params, Some(&settings));
        // now = 0.6*1000 + 0.4*800*0.9 = 888
        assert!(approx_eq(v.now_score, 888.0, 1e-9), "now {}", v.now_score);
        // future = 0.4*1000 + 0.6*600*0.9 = 724
        assert!(approx_eq(v.future_score, 724.0, 1e-9), "future {}", v.future_score);
    }

    #[test]
    fn superflex_raises_qb_composite() {
        let params = CalibrationParameters::default();
        let lineup = StartingLineup {
            superflex: 1,
            ..StartingLineup::default()
        };
        let off = LeagueSettings {
            lineup,
            ..LeagueSettings::default()
        };
        let on = LeagueSettings {
            superflex: true,
            ..off.clone()
        };
        let qb = ValuationInput {
            position: Position::Quarterback,
            age: Some(27),
            ..rb_input()
        };
        let v_off = valuate(&qb, &params, Some(&off));
        let v_on = valuate(&qb, &params, Some(&on));
        assert!(v_on.composite_value > v_off.composite_value);
        assert!(approx_eq(
            v_on.composite_value / v_off.composite_value,
            1.25,
            1e-9
        ));
    }

    #[test]
    fn alpha_comes_from_parameters() {
        let params = CalibrationParameters {
            alpha: 0.3,
            ..CalibrationParameters::default()
        };
        let v = valuate(&rb_input(), &params, None);
        assert_eq!(v.alpha, 0.3);
        assert!(approx_eq(v.composite_value, 0.3 * 920.0 + 0.7 * 760.0, 1e-9));
    }
}
