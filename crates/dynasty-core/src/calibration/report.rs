// Fit metrics and the rank-shift review report for a candidate parameter
// set.

use std::cmp::Ordering;

use crate::calibration::run::{
    CalibrationMetrics, FitMetrics, PositionMetrics, PositionRankShift, RankShiftEntry,
    RankShiftReport,
};
use crate::model::{PlayerRecord, Position};
use crate::stats::{mape, spearman};
use crate::valuation::{valuate_player, CalibrationParameters};

fn fit_metrics(params: &CalibrationParameters, players: &[&PlayerRecord]) -> FitMetrics {
    let (predicted, actual): (Vec<f64>, Vec<f64>) = players
        .iter()
        .map(|p| {
            (
                valuate_player(p, params, None).composite_value,
                p.market_value.unwrap_or(0.0),
            )
        })
        .unzip();
    FitMetrics {
        spearman: spearman(&predicted, &actual),
        mape: mape(&predicted, &actual),
        sample_size: players.len(),
    }
}

/// Overall and per-position Spearman and MAPE over `players`.
pub fn compute_metrics(params: &CalibrationParameters, players: &[&PlayerRecord]) -> CalibrationMetrics {
    let per_position = Position::ALL
        .iter()
        .map(|&position| {
            let group: Vec<&PlayerRecord> = players
                .iter()
                .copied()
                .filter(|p| p.position == position)
                .collect();
            PositionMetrics {
                position,
                metrics: fit_metrics(params, &group),
            }
        })
        .collect();

    CalibrationMetrics {
        overall: fit_metrics(params, players),
        per_position,
    }
}

fn desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// For each position, the `top_n` players by market value ranked by market
/// (before) and by composite value under `params` (after). Moves of at
/// least `threshold` places are flagged significant.
pub fn rank_shift_report(
    params: &CalibrationParameters,
    players: &[&PlayerRecord],
    top_n: usize,
    threshold: usize,
) -> RankShiftReport {
    let positions = Position::ALL
        .iter()
        .map(|&position| {
            let mut group: Vec<(&PlayerRecord, f64)> = players
                .iter()
                .copied()
                .filter(|p| p.position == position)
                .map(|p| (p, valuate_player(p, params, None).composite_value))
                .collect();

            group.sort_by(|a, b| {
                desc(a.0.market_value.unwrap_or(0.0), b.0.market_value.unwrap_or(0.0))
                    .then_with(|| a.0.id.cmp(&b.0.id))
            });
            group.truncate(top_n);

            let mut by_composite: Vec<usize> = (0..group.len()).collect();
            by_composite.sort_by(|&a, &b| {
                desc(group[a].1, group[b].1).then_with(|| group[a].0.id.cmp(&group[b].0.id))
            });
            let mut after_rank = vec![0; group.len()];
            for (rank, &idx) in by_composite.iter().enumerate() {
                after_rank[idx] = rank + 1;
            }

            let entries: Vec<RankShiftEntry> = group
                .iter()
                .enumerate()
                .map(|(i, (player, _))| {
                    let before_rank = i + 1;
                    let shift = before_rank as i64 - after_rank[i] as i64;
                    RankShiftEntry {
                        player_id: player.id.clone(),
                        name: player.name.clone(),
                        before_rank,
                        after_rank: after_rank[i],
                        shift,
                        significant: shift.unsigned_abs() >= threshold as u64,
                    }
                })
                .collect();
            let significant_count = entries.iter().filter(|e| e.significant).count();

            PositionRankShift {
                position,
                entries,
                significant_count,
            }
        })
        .collect();

    RankShiftReport {
        top_n,
        threshold,
        positions,
    }
}
