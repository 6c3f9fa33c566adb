// Domain records: positions, players, picks, league settings.

pub mod player;
pub mod position;
pub mod settings;

pub use player::{Asset, PickAsset, PlayerRecord, PlayerStatus};
pub use position::Position;
pub use settings::{LeagueSettings, ScoringFormat, SettingsError, SettingsFingerprint, StartingLineup};
