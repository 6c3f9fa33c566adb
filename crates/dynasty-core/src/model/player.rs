// Player and draft-pick records consumed by the valuation core.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::position::Position;

/// Roster status reported by the ingestion layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerStatus {
    #[default]
    Active,
    Questionable,
    Doubtful,
    Out,
    InjuredReserve,
    Suspended,
    Retired,
    /// Any status string we do not recognize. Valued neutrally.
    Unknown,
}

impl PlayerStatus {
    /// Parse a status string. Unrecognized values map to `Unknown` rather
    /// than failing, so a new upstream status never breaks valuation.
    pub fn from_str_status(s: &str) -> Self {
        match s.trim().to_uppercase().replace(['-', '_', ' '], "").as_str() {
            "ACTIVE" | "A" => PlayerStatus::Active,
            "QUESTIONABLE" | "Q" => PlayerStatus::Questionable,
            "DOUBTFUL" | "D" => PlayerStatus::Doubtful,
            "OUT" | "O" => PlayerStatus::Out,
            "IR" | "INJUREDRESERVE" => PlayerStatus::InjuredReserve,
            "SUSPENDED" | "SUS" => PlayerStatus::Suspended,
            "RETIRED" | "RET" => PlayerStatus::Retired,
            _ => PlayerStatus::Unknown,
        }
    }

    /// Return the display string for this status.
    pub fn display_str(&self) -> &'static str {
        match self {
            PlayerStatus::Active => "Active",
            PlayerStatus::Questionable => "Questionable",
            PlayerStatus::Doubtful => "Doubtful",
            PlayerStatus::Out => "Out",
            PlayerStatus::InjuredReserve => "IR",
            PlayerStatus::Suspended => "Suspended",
            PlayerStatus::Retired => "Retired",
            PlayerStatus::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_str())
    }
}

/// A player as supplied by the ingestion layer. Market value and both
/// projections are optional: valuation treats a gap as zero, calibration
/// excludes the player from training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: String,
    pub name: String,
    pub position: Position,
    pub age: Option<u32>,
    pub status: PlayerStatus,
    pub market_value: Option<f64>,
    pub proj_now: Option<f64>,
    pub proj_future: Option<f64>,
}

impl PlayerRecord {
    /// Whether the record can serve as a calibration target (market value
    /// and both projections present).
    pub fn is_trainable(&self) -> bool {
        self.market_value.is_some() && self.proj_now.is_some() && self.proj_future.is_some()
    }
}

/// A rookie draft pick. Picks are position-independent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PickAsset {
    pub year: i32,
    pub round: u32,
    /// Known market value for this specific pick slot, overriding the
    /// default base value when present.
    pub baseline_value: Option<f64>,
}

/// Anything that can appear on one side of a trade.
#[derive(Debug, Clone, PartialEq)]
pub enum Asset {
    Player(PlayerRecord),
    Pick(PickAsset),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_status_spellings() {
        assert_eq!(PlayerStatus::from_str_status("Active"), PlayerStatus::Active);
        assert_eq!(PlayerStatus::from_str_status("q"), PlayerStatus::Questionable);
        assert_eq!(PlayerStatus::from_str_status("IR"), PlayerStatus::InjuredReserve);
        assert_eq!(
            PlayerStatus::from_str_status("injured_reserve"),
            PlayerStatus::InjuredReserve
        );
        assert_eq!(PlayerStatus::from_str_status("RETIRED"), PlayerStatus::Retired);
    }

    #[test]
    fn unrecognized_status_is_unknown() {
        assert_eq!(PlayerStatus::from_str_status("PUP"), PlayerStatus::Unknown);
        assert_eq!(PlayerStatus::from_str_status(""), PlayerStatus::Unknown);
    }

    #[test]
    fn trainable_requires_all_three_inputs() {
        let mut player = PlayerRecord {
            id: "p1".into(),
            name: "Test Back".into(),
            position: Position::RunningBack,
            age: Some(24),
            status: PlayerStatus::Active,
            market_value: Some(1000.0),
            proj_now: Some(800.0),
            proj_future: Some(600.0),
        };
        assert!(player.is_trainable());

        player.proj_future = None;
        assert!(!player.is_trainable());

        player.proj_future = Some(600.0);
        player.market_value = None;
        assert!(!player.is_trainable());
    }
}
