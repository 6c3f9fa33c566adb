// Bounded coordinate search over the valuation parameters.
//
// The search nudges one coordinate at a time toward whichever value better
// explains market rank order on the training players. Every coordinate
// stays inside its search box and within `max_drift` of the starting set.
// The search box is wider than the guardrails on purpose: a fit that wants
// to leave the safe region is reported as a guardrail failure, not hidden.

use crate::model::{PlayerRecord, Position};
use crate::stats::spearman;
use crate::valuation::{valuate_player, CalibrationParameters};

/// Smallest objective gain that counts as an improvement.
const MIN_IMPROVEMENT: f64 = 1e-9;

/// Step sizes below this end the search.
const MIN_STEP: f64 = 1e-4;

/// Upper bound for age-curve anchor multipliers during the search.
const MAX_ANCHOR_MULTIPLIER: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchConfig {
    pub step: f64,
    pub max_passes: usize,
    pub max_drift: f64,
}

/// One tunable scalar inside [`CalibrationParameters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coordinate {
    Alpha,
    /// Market share of the now score. The projection share moves by the
    /// same amount in the other direction.
    MarketShareNow,
    MarketShareFuture,
    AgeAnchor(Position, usize),
}

impl Coordinate {
    fn get(&self, params: &CalibrationParameters) -> f64 {
        match *self {
            Coordinate::Alpha => params.alpha,
            Coordinate::MarketShareNow => params.weights.market_now,
            Coordinate::MarketShareFuture => params.weights.market_future,
            Coordinate::AgeAnchor(pos, i) => params.age_curves.get(pos).anchors()[i].multiplier,
        }
    }

    fn set(&self, params: &mut CalibrationParameters, value: f64) {
        match *self {
            Coordinate::Alpha => params.alpha = value,
            Coordinate::MarketShareNow => {
                let delta = value - params.weights.market_now;
                params.weights.market_now = value;
                params.weights.projection_now -= delta;
            }
            Coordinate::MarketShareFuture => {
                let delta = value - params.weights.market_future;
                params.weights.market_future = value;
                params.weights.projection_future -= delta;
            }
            Coordinate::AgeAnchor(pos, i) => {
                params.age_curves.get_mut(pos).anchors_mut()[i].multiplier = value;
            }
        }
    }

    /// Search box for the coordinate at `params`. A market share can take
    /// at most the whole pair, so its projection partner never goes negative.
    fn bounds(&self, params: &CalibrationParameters) -> (f64, f64) {
        let w = &params.weights;
        match self {
            Coordinate::Alpha => (0.0, 1.0),
            Coordinate::MarketShareNow => (0.0, w.market_now + w.projection_now),
            Coordinate::MarketShareFuture => (0.0, w.market_future + w.projection_future),
            Coordinate::AgeAnchor(..) => (0.0, MAX_ANCHOR_MULTIPLIER),
        }
    }
}

/// Every coordinate of `params`, in search order.
pub fn coordinates(params: &CalibrationParameters) -> Vec<Coordinate> {
    let mut coords = vec![
        Coordinate::Alpha,
        Coordinate::MarketShareNow,
        Coordinate::MarketShareFuture,
    ];
    for position in Position::ALL {
        let anchors = params.age_curves.get(position).anchors().len();
        coords.extend((0..anchors).map(|i| Coordinate::AgeAnchor(position, i)));
    }
    coords
}

/// Spearman rho between composite value (baseline mode) and market value.
pub fn rank_fit(params: &CalibrationParameters, players: &[&PlayerRecord]) -> f64 {
    let (predicted, actual): (Vec<f64>, Vec<f64>) = players
        .iter()
        .map(|p| {
            let v = valuate_player(p, params, None);
            (v.composite_value, p.market_value.unwrap_or(0.0))
        })
        .unzip();
    spearman(&predicted, &actual)
}

/// Fit parameters to `training`, starting from `start`. Returns the fitted
/// set and its training objective.
pub fn fit(
    start: &CalibrationParameters,
    training: &[&PlayerRecord],
    config: &SearchConfig,
) -> (CalibrationParameters, f64) {
    let coords = coordinates(start);
    let mut best = start.clone();
    let mut best_score = rank_fit(&best, training);
    let mut step = config.step;

    for _ in 0..config.max_passes {
        if step < MIN_STEP {
            break;
        }
        let mut improved = false;
        for coord in &coords {
            let origin = coord.get(start);
            let current = coord.get(&best);
            let (lo, hi) = coord.bounds(&best);
            for direction in [1.0, -1.0] {
                let candidate_value = current + direction * step;
                if candidate_value < lo
                    || candidate_value > hi
                    || (candidate_value - origin).abs() > config.max_drift + 1e-12
                {
                    continue;
                }
                let mut candidate = best.clone();
                coord.set(&mut candidate, candidate_value);
                let score = rank_fit(&candidate, training);
                if score > best_score + MIN_IMPROVEMENT {
                    best = candidate;
                    best_score = score;
                    improved = true;
                    break;
                }
            }
        }
        if !improved {
            step /= 2.0;
        }
    }

    (best, best_score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PlayerStatus;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    fn config() -> SearchConfig {
        SearchConfig {
            step: 0.05,
            max_passes: 6,
            max_drift: 0.2,
        }
    }

    /// Market tracks current projections only; the future projection is
    /// noise that runs against it.
    fn projection_driven_pool() -> Vec<PlayerRecord> {
        (0..40)
            .map(|i| {
                let proj_now = 50.0 + 10.0 * i as f64;
                PlayerRecord {
                    id: format!("w{i:02}"),
                    name: format!("WR {i}"),
                    position: Position::WideReceiver,
                    age: Some(27),
                    status: PlayerStatus::Active,
                    market_value: Some(proj_now * 4.0 + ((i * 37) % 11) as f64 * 30.0),
                    proj_now: Some(proj_now),
                    proj_future: Some(3000.0 - 60.0 * i as f64),
                }
            })
            .collect()
    }

    #[test]
    fn market_share_moves_keep_weight_sums() {
        let mut params = CalibrationParameters::default();
        Coordinate::MarketShareNow.set(&mut params, 0.7);
        assert!(approx_eq(params.weights.market_now + params.weights.projection_now, 1.0, 1e-12));
        Coordinate::MarketShareFuture.set(&mut params, 0.3);
        assert!(approx_eq(params.weights.projection_future, 0.7, 1e-12));
    }

    #[test]
    fn market_share_cannot_push_projection_negative() {
        let mut start = CalibrationParameters::default();
        start.weights.market_future = 0.4;
        start.weights.projection_future = 0.1;
        assert_eq!(Coordinate::MarketShareFuture.bounds(&start), (0.0, 0.5));

        let players = projection_driven_pool();
        let refs: Vec<&PlayerRecord> = players.iter().collect();
        let wide = SearchConfig {
            step: 0.1,
            max_passes: 20,
            max_drift: 1.0,
        };
        let (fitted, _) = fit(&start, &refs, &wide);
        let w = &fitted.weights;
        for weight in [w.market_now, w.projection_now, w.market_future, w.projection_future] {
            assert!(weight >= -1e-12, "negative weight in {w:?}");
        }
        assert!(approx_eq(w.market_future + w.projection_future, 0.5, 1e-9));
    }

    #[test]
    fn coordinates_cover_every_anchor() {
        let params = CalibrationParameters::default();
        let anchors: usize = Position::ALL
            .iter()
            .map(|&p| params.age_curves.get(p).anchors().len())
            .sum();
        assert_eq!(coordinates(&params).len(), 3 + anchors);
    }

    #[test]
    fn fit_never_worsens_training_objective() {
        let players = projection_driven_pool();
        let refs: Vec<&PlayerRecord> = players.iter().collect();
        let start = CalibrationParameters::default();
        let before = rank_fit(&start, &refs);
        let (fitted, after) = fit(&start, &refs, &config());
        assert!(after >= before);
        assert!(approx_eq(after, rank_fit(&fitted, &refs), 1e-12));
    }

    #[test]
    fn fit_respects_drift_limit() {
        let players = projection_driven_pool();
        let refs: Vec<&PlayerRecord> = players.iter().collect();
        let start = CalibrationParameters::default();
        let (fitted, _) = fit(&start, &refs, &config());
        for coord in coordinates(&start) {
            let moved = (coord.get(&fitted) - coord.get(&start)).abs();
            assert!(moved <= 0.2 + 1e-9, "{coord:?} moved {moved}");
        }
    }

    #[test]
    fn fit_shifts_weight_toward_explanatory_input() {
        let players = projection_driven_pool();
        let refs: Vec<&PlayerRecord> = players.iter().collect();
        let start = CalibrationParameters::default();
        let (fitted, after) = fit(&start, &refs, &config());
        assert!(after > rank_fit(&start, &refs));
        // Future projections run against the market: the search leans on
        // the now score and the market side of the future blend.
        assert!(
            fitted.alpha > start.alpha || fitted.weights.market_future > start.weights.market_future,
            "alpha {} market_future {}",
            fitted.alpha,
            fitted.weights.market_future
        );
    }

    #[test]
    fn empty_training_set_is_a_no_op() {
        let start = CalibrationParameters::default();
        let (fitted, score) = fit(&start, &[], &config());
        assert_eq!(fitted, start);
        assert_eq!(score, 0.0);
    }
}
