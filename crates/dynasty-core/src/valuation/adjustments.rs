// League-settings multipliers.
//
// Translates a league configuration into per-position multipliers: a
// superflex QB bonus, the TE premium, a scoring-format factor for projection
// components, and a positional scarcity factor derived from replacement rank.

use serde::{Deserialize, Serialize};

use crate::model::{LeagueSettings, Position, StartingLineup};
use crate::valuation::params::ScoringMultipliers;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// QB bonus in superflex leagues.
pub const SUPERFLEX_QB_BONUS: f64 = 1.25;

/// League size the scarcity factor is measured against.
pub const BASELINE_NUM_TEAMS: u32 = 12;

/// Relative FLEX usage by position. Only flex-eligible positions take a share.
const FLEX_WEIGHT: [f64; 4] = [0.0, 0.45, 0.45, 0.10];

/// Share of each SUPERFLEX slot apportioned to a position.
const SUPERFLEX_SHARE: [f64; 4] = [0.85, 0.05, 0.08, 0.02];

/// Multiplier gained per unit of replacement-rank ratio above 1.0.
const VOR_SENSITIVITY: f64 = 0.20;

/// Scarcity can never push value outside this band.
pub const VOR_MIN_MULTIPLIER: f64 = 0.85;
pub const VOR_MAX_MULTIPLIER: f64 = 1.20;

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Per-position multipliers for one league configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SettingsAdjustments {
    pub qb_multiplier: f64,
    pub te_multiplier: f64,
    /// Applied to projection components only, never folded into
    /// `combined_multiplier`.
    pub scoring_factor: f64,
    pub vor_multiplier: f64,
    /// `qb_multiplier * te_multiplier * vor_multiplier`.
    pub combined_multiplier: f64,
}

// ---------------------------------------------------------------------------
// Replacement rank
// ---------------------------------------------------------------------------

/// Share of each FLEX slot apportioned to `position`, normalized over the
/// flex-eligible positions.
fn flex_share(position: Position) -> f64 {
    if !position.is_flex_eligible() {
        return 0.0;
    }
    let total: f64 = Position::ALL
        .iter()
        .filter(|p| p.is_flex_eligible())
        .map(|p| FLEX_WEIGHT[p.index()])
        .sum();
    FLEX_WEIGHT[position.index()] / total
}

/// Effective number of startable players at `position` across the league.
///
/// Dedicated slots count fully; FLEX and SUPERFLEX slots are split across
/// their eligible positions by fixed shares, so a flex slot is never counted
/// once per eligible position.
pub fn replacement_rank(position: Position, num_teams: u32, lineup: &StartingLineup) -> f64 {
    let idx = position.index();
    let per_team = f64::from(lineup.dedicated(position))
        + f64::from(lineup.flex) * flex_share(position)
        + f64::from(lineup.superflex) * SUPERFLEX_SHARE[idx];
    f64::from(num_teams) * per_team
}

/// Replacement rank in the reference 12-team 1QB/2RB/2WR/1TE/1FLEX league.
pub fn baseline_replacement_rank(position: Position) -> f64 {
    replacement_rank(position, BASELINE_NUM_TEAMS, &StartingLineup::default())
}

/// Map a league's replacement rank to a bounded scarcity multiplier.
///
/// A deeper starting requirement than baseline (ratio > 1) pushes the
/// replacement player further down the pool and raises the value of
/// startable players; a shallower one lowers it.
pub fn vor_multiplier(position: Position, settings: &LeagueSettings) -> f64 {
    let baseline = baseline_replacement_rank(position);
    if baseline <= 0.0 {
        return 1.0;
    }
    let ratio = replacement_rank(position, settings.num_teams, &settings.lineup) / baseline;
    (1.0 + (ratio - 1.0) * VOR_SENSITIVITY).clamp(VOR_MIN_MULTIPLIER, VOR_MAX_MULTIPLIER)
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Multipliers for `position` under `settings`, using the built-in scoring
/// factors.
pub fn compute_settings_adjustments(
    position: Position,
    settings: &LeagueSettings,
) -> SettingsAdjustments {
    compute_settings_adjustments_with(position, settings, &ScoringMultipliers::default())
}

/// Multipliers for `position` under `settings`, taking scoring factors from
/// a calibrated parameter set.
pub fn compute_settings_adjustments_with(
    position: Position,
    settings: &LeagueSettings,
    scoring: &ScoringMultipliers,
) -> SettingsAdjustments {
    let qb_multiplier = if position == Position::Quarterback && settings.superflex {
        SUPERFLEX_QB_BONUS
    } else {
        1.0
    };

    let te_multiplier = if position == Position::TightEnd && settings.te_premium {
        settings.te_premium_multiplier
    } else {
        1.0
    };

    let scoring_factor = scoring.get(settings.scoring);
    let vor_multiplier = vor_multiplier(position, settings);

    SettingsAdjustments {
        qb_multiplier,
        te_multiplier,
        scoring_factor,
        vor_multiplier,
        combined_multiplier: qb_multiplier * te_multiplier * vor_multiplier,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
