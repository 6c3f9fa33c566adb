// League settings and the canonical settings fingerprint.
//
// The fingerprint is the partition key for cached valuations: two settings
// objects that mean the same thing must hash identically, regardless of how
// they were constructed.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::model::position::Position;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("invalid league setting `{field}`: {message}")]
    Invalid { field: String, message: String },
}

fn invalid(field: &str, message: impl Into<String>) -> SettingsError {
    SettingsError::Invalid {
        field: field.to_string(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Scoring format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringFormat {
    Ppr,
    Half,
    Standard,
}

impl ScoringFormat {
    pub const ALL: [ScoringFormat; 3] =
        [ScoringFormat::Ppr, ScoringFormat::Half, ScoringFormat::Standard];

    pub fn from_str_format(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ppr" | "full" | "full_ppr" => Some(ScoringFormat::Ppr),
            "half" | "half_ppr" | "0.5" => Some(ScoringFormat::Half),
            "standard" | "std" | "non_ppr" => Some(ScoringFormat::Standard),
            _ => None,
        }
    }

    pub fn display_str(&self) -> &'static str {
        match self {
            ScoringFormat::Ppr => "ppr",
            ScoringFormat::Half => "half",
            ScoringFormat::Standard => "standard",
        }
    }
}

impl fmt::Display for ScoringFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_str())
    }
}

// ---------------------------------------------------------------------------
// Starting lineup
// ---------------------------------------------------------------------------

/// Starting slots per team. FLEX accepts RB/WR/TE; SUPERFLEX accepts any
/// valued position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StartingLineup {
    pub qb: u32,
    pub rb: u32,
    pub wr: u32,
    pub te: u32,
    #[serde(default)]
    pub flex: u32,
    #[serde(default)]
    pub superflex: u32,
}

impl StartingLineup {
    /// Dedicated (non-flex) slots for a position.
    pub fn dedicated(&self, position: Position) -> u32 {
        match position {
            Position::Quarterback => self.qb,
            Position::RunningBack => self.rb,
            Position::WideReceiver => self.wr,
            Position::TightEnd => self.te,
        }
    }

    pub fn total_starters(&self) -> u32 {
        self.qb + self.rb + self.wr + self.te + self.flex + self.superflex
    }
}

impl Default for StartingLineup {
    /// 1QB / 2RB / 2WR / 1TE / 1FLEX.
    fn default() -> Self {
        Self {
            qb: 1,
            rb: 2,
            wr: 2,
            te: 1,
            flex: 1,
            superflex: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// LeagueSettings
// ---------------------------------------------------------------------------

pub const MIN_LEAGUE_SIZE: u32 = 2;
pub const MAX_LEAGUE_SIZE: u32 = 32;
pub const MAX_TE_PREMIUM_MULTIPLIER: f64 = 2.0;

/// The closed set of league options the valuation core understands.
///
/// Construct through [`LeagueSettings::new`] so range checks run; the fields
/// stay public for read access and test fixtures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueSettings {
    pub scoring: ScoringFormat,
    pub superflex: bool,
    pub te_premium: bool,
    pub te_premium_multiplier: f64,
    pub num_teams: u32,
    pub lineup: StartingLineup,
}

impl LeagueSettings {
    /// Validating constructor.
    pub fn new(
        scoring: ScoringFormat,
        superflex: bool,
        te_premium: bool,
        te_premium_multiplier: f64,
        num_teams: u32,
        lineup: StartingLineup,
    ) -> Result<Self, SettingsError> {
        let settings = Self {
            scoring,
            superflex,
            te_premium,
            te_premium_multiplier,
            num_teams,
            lineup,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Check ranges on an already-built settings object.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(MIN_LEAGUE_SIZE..=MAX_LEAGUE_SIZE).contains(&self.num_teams) {
            return Err(invalid(
                "num_teams",
                format!(
                    "must be between {MIN_LEAGUE_SIZE} and {MAX_LEAGUE_SIZE}, got {}",
                    self.num_teams
                ),
            ));
        }
        if self.lineup.total_starters() == 0 {
            return Err(invalid("lineup", "must contain at least one starting slot"));
        }
        if !self.te_premium_multiplier.is_finite() {
            return Err(invalid("te_premium_multiplier", "must be a finite number"));
        }
        if self.te_premium {
            let m = self.te_premium_multiplier;
            if m <= 1.0 || m > MAX_TE_PREMIUM_MULTIPLIER {
                return Err(invalid(
                    "te_premium_multiplier",
                    format!("must be in (1.0, {MAX_TE_PREMIUM_MULTIPLIER}] when te_premium is on, got {m}"),
                ));
            }
        }
        if self.superflex && self.lineup.superflex == 0 {
            return Err(invalid(
                "lineup.superflex",
                "superflex leagues need at least one SUPERFLEX slot",
            ));
        }
        Ok(())
    }

    /// Canonical hash of the normalized settings.
    ///
    /// Normalization: the TE premium multiplier only matters when TE premium
    /// is on (otherwise it is pinned to 1.0), and floats are rounded to
    /// hundredths. The canonical form is serialized through a `BTreeMap` so
    /// key order is fixed.
    pub fn fingerprint(&self) -> SettingsFingerprint {
        let te_multiplier = if self.te_premium {
            self.te_premium_multiplier
        } else {
            1.0
        };

        let mut canonical: BTreeMap<&str, serde_json::Value> = BTreeMap::new();
        canonical.insert("scoring", self.scoring.display_str().into());
        canonical.insert("superflex", self.superflex.into());
        canonical.insert("te_premium", self.te_premium.into());
        canonical.insert("te_premium_multiplier_x100", round_hundredths(te_multiplier).into());
        canonical.insert("num_teams", self.num_teams.into());

        let mut lineup: BTreeMap<&str, u32> = BTreeMap::new();
        lineup.insert("qb", self.lineup.qb);
        lineup.insert("rb", self.lineup.rb);
        lineup.insert("wr", self.lineup.wr);
        lineup.insert("te", self.lineup.te);
        lineup.insert("flex", self.lineup.flex);
        lineup.insert("superflex", self.lineup.superflex);
        canonical.insert(
            "lineup",
            serde_json::to_value(lineup).unwrap_or(serde_json::Value::Null),
        );

        let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
        let digest = Sha256::digest(&bytes);
        SettingsFingerprint(format!("{digest:x}"))
    }
}

impl Default for LeagueSettings {
    /// 12-team 1QB PPR, no TE premium.
    fn default() -> Self {
        Self {
            scoring: ScoringFormat::Ppr,
            superflex: false,
            te_premium: false,
            te_premium_multiplier: 1.0,
            num_teams: 12,
            lineup: StartingLineup::default(),
        }
    }
}

/// Round to hundredths and return as an integer so the hash never sees
/// floating-point noise.
fn round_hundredths(value: f64) -> i64 {
    (value * 100.0).round() as i64
}

/// Hex-encoded SHA-256 of the canonical settings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SettingsFingerprint(pub String);

impl SettingsFingerprint {
    /// Fingerprint used for valuations computed without league settings.
    pub fn baseline() -> Self {
        SettingsFingerprint("baseline".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SettingsFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn superflex_lineup() -> StartingLineup {
        StartingLineup {
            superflex: 1,
            ..StartingLineup::default()
        }
    }

    #[test]
    fn default_settings_are_valid() {
        assert!(LeagueSettings::default().validate().is_ok());
    }

    #[test]
    fn rejects_tiny_league() {
        let err = LeagueSettings::new(
            ScoringFormat::Ppr,
            false,
            false,
            1.0,
            1,
            StartingLineup::default(),
        )
        .unwrap_err();
        match err {
            SettingsError::Invalid { field, .. } => assert_eq!(field, "num_teams"),
        }
    }

    #[test]
    fn rejects_te_premium_without_bonus() {
        let err = LeagueSettings::new(
            ScoringFormat::Ppr,
            false,
            true,
            1.0,
            12,
            StartingLineup::default(),
        )
        .unwrap_err();
        match err {
            SettingsError::Invalid { field, .. } => assert_eq!(field, "te_premium_multiplier"),
        }
    }

    #[test]
    fn rejects_superflex_without_slot() {
        let err = LeagueSettings::new(
            ScoringFormat::Ppr,
            true,
            false,
            1.0,
            12,
            StartingLineup::default(),
        )
        .unwrap_err();
        match err {
            SettingsError::Invalid { field, .. } => assert_eq!(field, "lineup.superflex"),
        }
    }

    #[test]
    fn rejects_empty_lineup() {
        let lineup = StartingLineup {
            qb: 0,
            rb: 0,
            wr: 0,
            te: 0,
            flex: 0,
            superflex: 0,
        };
        assert!(LeagueSettings::new(ScoringFormat::Half, false, false, 1.0, 10, lineup).is_err());
    }

    #[test]
    fn fingerprint_is_stable_for_identical_settings() {
        let a = LeagueSettings::new(ScoringFormat::Ppr, true, true, 1.5, 12, superflex_lineup())
            .unwrap();
        let b = LeagueSettings::new(ScoringFormat::Ppr, true, true, 1.5, 12, superflex_lineup())
            .unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().as_str().len(), 64);
    }

    #[test]
    fn fingerprint_ignores_float_noise() {
        let a = LeagueSettings::new(ScoringFormat::Ppr, false, true, 1.5, 12, StartingLineup::default())
            .unwrap();
        let b = LeagueSettings::new(
            ScoringFormat::Ppr,
            false,
            true,
            1.500_000_1,
            12,
            StartingLineup::default(),
        )
        .unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_ignores_unused_te_multiplier() {
        let mut a = LeagueSettings::default();
        a.te_premium_multiplier = 1.0;
        let mut b = LeagueSettings::default();
        b.te_premium_multiplier = 1.75;
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_meaningful_fields() {
        let base = LeagueSettings::default();
        let mut half = base.clone();
        half.scoring = ScoringFormat::Half;
        let mut ten_team = base.clone();
        ten_team.num_teams = 10;
        let mut three_wr = base.clone();
        three_wr.lineup.wr = 3;

        let fp = base.fingerprint();
        assert_ne!(fp, half.fingerprint());
        assert_ne!(fp, ten_team.fingerprint());
        assert_ne!(fp, three_wr.fingerprint());
    }

    #[test]
    fn scoring_format_parses_aliases() {
        assert_eq!(ScoringFormat::from_str_format("PPR"), Some(ScoringFormat::Ppr));
        assert_eq!(ScoringFormat::from_str_format("half_ppr"), Some(ScoringFormat::Half));
        assert_eq!(ScoringFormat::from_str_format("std"), Some(ScoringFormat::Standard));
        assert_eq!(ScoringFormat::from_str_format("tep"), None);
    }
}
