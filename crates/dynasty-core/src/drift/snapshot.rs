// Point-in-time captures of the valued player pool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

use crate::model::{PlayerRecord, Position};
use crate::valuation::{valuate_player, ParameterVersion};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub player_id: String,
    pub name: String,
    pub position: Position,
    pub market_value: f64,
    pub proj_now: f64,
    pub proj_future: f64,
    pub composite_value: f64,
}

/// Every player with a market value, valued in baseline mode under one
/// parameter version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationSnapshot {
    pub id: Uuid,
    pub taken_at: DateTime<Utc>,
    pub parameter_version: u64,
    pub entries: Vec<SnapshotEntry>,
}

impl ValuationSnapshot {
    /// Value `players` under `version`. Players without a market value have
    /// nothing to compare against and are left out.
    pub fn capture(players: &[PlayerRecord], version: &ParameterVersion) -> Self {
        let entries = players
            .iter()
            .filter_map(|p| {
                let market_value = p.market_value?;
                let valuation = valuate_player(p, &version.parameters, None);
                Some(SnapshotEntry {
                    player_id: p.id.clone(),
                    name: p.name.clone(),
                    position: p.position,
                    market_value,
                    proj_now: p.proj_now.unwrap_or(0.0),
                    proj_future: p.proj_future.unwrap_or(0.0),
                    composite_value: valuation.composite_value,
                })
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            taken_at: Utc::now(),
            parameter_version: version.version,
            entries,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries_for(&self, position: Position) -> impl Iterator<Item = &SnapshotEntry> {
        self.entries.iter().filter(move |e| e.position == position)
    }

    /// The `n` highest composite values, ties broken by player id.
    pub fn top_by_composite(&self, n: usize) -> Vec<&SnapshotEntry> {
        let mut sorted: Vec<&SnapshotEntry> = self.entries.iter().collect();
        sorted.sort_by(|a, b| by_composite_desc(a, b));
        sorted.truncate(n);
        sorted
    }

    /// QB/RB/WR/TE head counts among the top `n`, indexed by
    /// [`Position::index`].
    pub fn position_distribution(&self, n: usize) -> [f64; 4] {
        let mut counts = [0.0; 4];
        for entry in self.top_by_composite(n) {
            counts[entry.position.index()] += 1.0;
        }
        counts
    }
}

pub(crate) fn by_composite_desc(a: &SnapshotEntry, b: &SnapshotEntry) -> Ordering {
    b.composite_value
        .partial_cmp(&a.composite_value)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.player_id.cmp(&b.player_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PlayerStatus;
    use crate::valuation::ParameterRegistry;

    fn player(id: &str, position: Position, market: Option<f64>) -> PlayerRecord {
        PlayerRecord {
            id: id.into(),
            name: id.to_uppercase(),
            position,
            age: Some(25),
            status: PlayerStatus::Active,
            market_value: market,
            proj_now: Some(100.0),
            proj_future: None,
        }
    }

    #[test]
    fn capture_skips_players_without_market_value() {
        let registry = ParameterRegistry::with_defaults();
        let players = vec![
            player("a", Position::WideReceiver, Some(500.0)),
            player("b", Position::RunningBack, None),
        ];
        let snap = ValuationSnapshot::capture(&players, &registry.current());
        assert_eq!(snap.entries.len(), 1);
        assert_eq!(snap.entries[0].player_id, "a");
        assert_eq!(snap.entries[0].proj_future, 0.0);
        assert_eq!(snap.parameter_version, 0);
        assert!(snap.entries[0].composite_value > 0.0);
    }

    #[test]
    fn distribution_counts_only_top_entries() {
        let registry = ParameterRegistry::with_defaults();
        let players = vec![
            player("qb1", Position::Quarterback, Some(900.0)),
            player("wr1", Position::WideReceiver, Some(800.0)),
            player("wr2", Position::WideReceiver, Some(700.0)),
            player("te1", Position::TightEnd, Some(10.0)),
        ];
        let snap = ValuationSnapshot::capture(&players, &registry.current());
        assert_eq!(snap.position_distribution(3), [1.0, 0.0, 2.0, 0.0]);
        assert_eq!(snap.position_distribution(10), [1.0, 0.0, 2.0, 1.0]);
        let top: Vec<&str> = snap
            .top_by_composite(2)
            .iter()
            .map(|e| e.player_id.as_str())
            .collect();
        assert_eq!(top, vec!["qb1", "wr1"]);
    }
}
