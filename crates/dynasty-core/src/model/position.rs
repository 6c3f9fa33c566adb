// Fantasy football positions tracked by the valuation core.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Skill positions that carry dynasty value. Kickers and defenses are not
/// valued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Position {
    Quarterback,
    RunningBack,
    WideReceiver,
    TightEnd,
}

impl Position {
    /// Every valued position in display order.
    pub const ALL: [Position; 4] = [
        Position::Quarterback,
        Position::RunningBack,
        Position::WideReceiver,
        Position::TightEnd,
    ];

    /// Parse a position abbreviation ("QB", "rb", ...). Returns `None` for
    /// anything that is not one of the four valued positions.
    pub fn from_str_pos(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "QB" => Some(Position::Quarterback),
            "RB" => Some(Position::RunningBack),
            "WR" => Some(Position::WideReceiver),
            "TE" => Some(Position::TightEnd),
            _ => None,
        }
    }

    /// Return the display string for this position.
    pub fn display_str(&self) -> &'static str {
        match self {
            Position::Quarterback => "QB",
            Position::RunningBack => "RB",
            Position::WideReceiver => "WR",
            Position::TightEnd => "TE",
        }
    }

    /// Stable index into per-position arrays.
    pub fn index(&self) -> usize {
        match self {
            Position::Quarterback => 0,
            Position::RunningBack => 1,
            Position::WideReceiver => 2,
            Position::TightEnd => 3,
        }
    }

    /// Whether the position may fill a FLEX slot.
    pub fn is_flex_eligible(&self) -> bool {
        !matches!(self, Position::Quarterback)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_str())
    }
}
