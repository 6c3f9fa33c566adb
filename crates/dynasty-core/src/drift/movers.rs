// Within-position rank movement between two snapshots, with cause
// attribution.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::drift::snapshot::{by_composite_desc, SnapshotEntry, ValuationSnapshot};
use crate::model::Position;

/// Relative changes closer than this are treated as a tie, and the shift is
/// attributed to configuration rather than either input.
pub const CAUSE_MARGIN: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftCause {
    Market,
    Projections,
    Config,
}

impl DriftCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriftCause::Market => "market",
            DriftCause::Projections => "projections",
            DriftCause::Config => "config",
        }
    }
}

impl fmt::Display for DriftCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mover {
    pub player_id: String,
    pub name: String,
    pub position: Position,
    pub previous_rank: usize,
    pub current_rank: usize,
    /// `previous_rank - current_rank`; positive means the player climbed.
    pub rank_change: i64,
    pub cause: DriftCause,
    /// Relative change in market value, as a fraction.
    pub market_change: f64,
    /// Relative change in combined projections, as a fraction.
    pub projection_change: f64,
}

/// Fractional change from `before` to `after`. A move away from zero counts
/// as a full 100% change.
pub fn relative_change(before: f64, after: f64) -> f64 {
    if before == 0.0 {
        if after == 0.0 {
            0.0
        } else {
            1.0
        }
    } else {
        (after - before) / before.abs()
    }
}

/// Whichever input moved proportionally more explains the shift. When
/// neither clearly dominates, the parameters or settings did.
pub fn attribute_cause(prior: &SnapshotEntry, current: &SnapshotEntry) -> (DriftCause, f64, f64) {
    let market = relative_change(prior.market_value, current.market_value);
    let projections = relative_change(
        prior.proj_now + prior.proj_future,
        current.proj_now + current.proj_future,
    );
    let cause = if (market.abs() - projections.abs()).abs() < CAUSE_MARGIN {
        DriftCause::Config
    } else if market.abs() > projections.abs() {
        DriftCause::Market
    } else {
        DriftCause::Projections
    };
    (cause, market, projections)
}

/// 1-based rank of every entry within its position, by composite value.
pub fn within_position_ranks(snapshot: &ValuationSnapshot) -> HashMap<&str, usize> {
    let mut ranks = HashMap::with_capacity(snapshot.entries.len());
    for position in Position::ALL {
        let mut group: Vec<&SnapshotEntry> = snapshot.entries_for(position).collect();
        group.sort_by(|a, b| by_composite_desc(a, b));
        for (i, entry) in group.into_iter().enumerate() {
            ranks.insert(entry.player_id.as_str(), i + 1);
        }
    }
    ranks
}

/// Players present in both snapshots whose within-position rank moved by at
/// least `threshold`, largest moves first.
pub fn find_movers(
    prior: &ValuationSnapshot,
    current: &ValuationSnapshot,
    threshold: usize,
) -> Vec<Mover> {
    let prior_ranks = within_position_ranks(prior);
    let current_ranks = within_position_ranks(current);
    let prior_by_id: HashMap<&str, &SnapshotEntry> = prior
        .entries
        .iter()
        .map(|e| (e.player_id.as_str(), e))
        .collect();

    let mut movers: Vec<Mover> = current
        .entries
        .iter()
        .filter_map(|entry| {
            let id = entry.player_id.as_str();
            let before = prior_by_id.get(id)?;
            let previous_rank = *prior_ranks.get(id)?;
            let current_rank = *current_ranks.get(id)?;
            let rank_change = previous_rank as i64 - current_rank as i64;
            if rank_change.unsigned_abs() < threshold as u64 {
                return None;
            }
            let (cause, market_change, projection_change) = attribute_cause(before, entry);
            Some(Mover {
                player_id: entry.player_id.clone(),
                name: entry.name.clone(),
                position: entry.position,
                previous_rank,
                current_rank,
                rank_change,
                cause,
                market_change,
                projection_change,
            })
        })
        .collect();

    movers.sort_by(|a, b| {
        b.rank_change
            .abs()
            .cmp(&a.rank_change.abs())
            .then_with(|| a.player_id.cmp(&b.player_id))
    });
    movers
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn entry(id: &str, composite: f64, market: f64, proj: f64) -> SnapshotEntry {
        SnapshotEntry {
            player_id: id.into(),
            name: id.into(),
            position: Position::WideReceiver,
            market_value: market,
            proj_now: proj,
            proj_future: proj,
            composite_value: composite,
        }
    }

    fn snapshot(entries: Vec<SnapshotEntry>) -> ValuationSnapshot {
        ValuationSnapshot {
            id: Uuid::new_v4(),
            taken_at: Utc::now(),
            parameter_version: 0,
            entries,
        }
    }

    /// Twenty receivers valued 2000, 1900, ... 100.
    fn ladder() -> Vec<SnapshotEntry> {
        (0..20)
            .map(|i| {
                let v = 2000.0 - 100.0 * i as f64;
                entry(&format!("wr{i:02}"), v, v, 100.0)
            })
            .collect()
    }

    #[test]
    fn relative_change_handles_zero_base() {
        assert_eq!(relative_change(0.0, 0.0), 0.0);
        assert_eq!(relative_change(0.0, 5.0), 1.0);
        assert!((relative_change(200.0, 150.0) + 0.25).abs() < 1e-12);
    }

    #[test]
    fn cause_follows_larger_relative_change() {
        let before = entry("x", 1000.0, 1000.0, 100.0);
        let market_jump = entry("x", 1500.0, 1500.0, 102.0);
        assert_eq!(attribute_cause(&before, &market_jump).0, DriftCause::Market);

        let proj_jump = entry("x", 1500.0, 1010.0, 160.0);
        assert_eq!(attribute_cause(&before, &proj_jump).0, DriftCause::Projections);

        let unchanged_inputs = entry("x", 1500.0, 1000.0, 100.0);
        assert_eq!(attribute_cause(&before, &unchanged_inputs).0, DriftCause::Config);
    }

    #[test]
    fn detects_large_within_position_move() {
        let prior = snapshot(ladder());
        let mut moved = ladder();
        // Last receiver jumps to the top through its market value.
        moved[19] = entry("wr19", 5000.0, 5000.0, 100.0);
        let current = snapshot(moved);

        let movers = find_movers(&prior, &current, 10);
        assert!(!movers.is_empty());
        let top = &movers[0];
        assert_eq!(top.player_id, "wr19");
        assert_eq!(top.previous_rank, 20);
        assert_eq!(top.current_rank, 1);
        assert_eq!(top.rank_change, 19);
        assert_eq!(top.cause, DriftCause::Market);
        // Everyone else slid down one spot: below threshold.
        assert_eq!(movers.len(), 1);
    }

    #[test]
    fn players_missing_from_prior_are_not_movers() {
        let prior = snapshot(ladder()[..10].to_vec());
        let current = snapshot(ladder());
        assert!(find_movers(&prior, &current, 1).is_empty());
    }

    #[test]
    fn ranks_are_per_position() {
        let mut entries = ladder();
        entries.push(SnapshotEntry {
            position: Position::TightEnd,
            ..entry("te", 1.0, 1.0, 1.0)
        });
        let snap = snapshot(entries);
        let ranks = within_position_ranks(&snap);
        assert_eq!(ranks["te"], 1);
        assert_eq!(ranks["wr00"], 1);
        assert_eq!(ranks["wr19"], 20);
    }
}
