// Configuration loading and parsing (league.toml, engine.toml).

use chrono::Datelike;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::model::{LeagueSettings, ScoringFormat, SettingsError, StartingLineup};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

impl From<SettingsError> for ConfigError {
    fn from(e: SettingsError) -> Self {
        match e {
            SettingsError::Invalid { field, message } => ConfigError::ValidationError {
                field: format!("league.{field}"),
                message,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub league: LeagueConfig,
    pub valuation: ValuationConfig,
    pub calibration: CalibrationConfig,
    pub drift: DriftConfig,
    pub db_path: String,
    pub data_paths: DataPaths,
}

// ---------------------------------------------------------------------------
// league.toml structs
// ---------------------------------------------------------------------------

/// Wrapper for the top-level `[league]` table in league.toml.
#[derive(Debug, Clone, Deserialize)]
struct LeagueFile {
    league: LeagueSection,
}

#[derive(Debug, Clone, Deserialize)]
struct LeagueSection {
    name: String,
    scoring: ScoringFormat,
    #[serde(default)]
    superflex: bool,
    #[serde(default)]
    te_premium: bool,
    #[serde(default = "neutral_multiplier")]
    te_premium_multiplier: f64,
    num_teams: u32,
    #[serde(default)]
    lineup: StartingLineup,
}

fn neutral_multiplier() -> f64 {
    1.0
}

/// The user's league: a display name plus the validated settings used for
/// settings-aware valuation.
#[derive(Debug, Clone)]
pub struct LeagueConfig {
    pub name: String,
    pub settings: LeagueSettings,
}

// ---------------------------------------------------------------------------
// engine.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire engine.toml file.
#[derive(Debug, Clone, Deserialize)]
struct EngineFile {
    #[serde(default)]
    valuation: ValuationConfig,
    #[serde(default)]
    calibration: CalibrationConfig,
    #[serde(default)]
    drift: DriftConfig,
    database: DatabaseSection,
    data: DataPaths,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValuationConfig {
    /// Draft year treated as "now" for pick discounting. Defaults to the
    /// current UTC year.
    #[serde(default)]
    pub current_year: Option<i32>,
}

impl ValuationConfig {
    pub fn resolved_year(&self) -> i32 {
        self.current_year.unwrap_or_else(|| chrono::Utc::now().year())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub folds: usize,
    pub seed: u64,
    /// Initial coordinate step of the local search.
    pub step: f64,
    pub max_passes: usize,
    /// Largest distance any coordinate may move from the starting set.
    pub max_drift: f64,
    pub min_training_players: usize,
    pub auto_promote: bool,
    pub rank_shift_top_n: usize,
    pub rank_shift_threshold: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            folds: 5,
            seed: 20_240_901,
            step: 0.05,
            max_passes: 4,
            max_drift: 0.2,
            min_training_players: 20,
            auto_promote: false,
            rank_shift_top_n: 50,
            rank_shift_threshold: 10,
        }
    }
}

/// Alert thresholds for the drift monitor. Correlations alert when they
/// fall *below* a threshold; divergence and mover fraction alert when they
/// rise *above* one.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct DriftThresholds {
    pub correlation_warning: f64,
    pub correlation_critical: f64,
    pub divergence_warning: f64,
    pub divergence_critical: f64,
    pub mover_fraction_warning: f64,
    pub mover_fraction_critical: f64,
}

impl Default for DriftThresholds {
    fn default() -> Self {
        Self {
            correlation_warning: 0.80,
            correlation_critical: 0.75,
            divergence_warning: 0.10,
            divergence_critical: 0.15,
            mover_fraction_warning: 0.15,
            mover_fraction_critical: 0.25,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    pub thresholds: DriftThresholds,
    /// Size of the top-valued set used for divergence and mover fraction.
    pub top_n: usize,
    pub mover_rank_threshold: usize,
    /// Positions with fewer snapshot entries than this get no correlation
    /// alerts of their own.
    pub min_position_sample: usize,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            thresholds: DriftThresholds::default(),
            top_n: 100,
            mover_rank_threshold: 10,
            min_position_sample: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataPaths {
    pub players: String,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/league.toml` and
/// `config/engine.toml`, relative to the given `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy defaults.
/// Prefer `load_config()` which handles default initialization automatically.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- league.toml (required) ---
    let league_path = config_dir.join("league.toml");
    let league_text = read_file(&league_path)?;
    let league_file: LeagueFile =
        toml::from_str(&league_text).map_err(|e| ConfigError::ParseError {
            path: league_path.clone(),
            source: e,
        })?;
    let section = league_file.league;
    let settings = LeagueSettings::new(
        section.scoring,
        section.superflex,
        section.te_premium,
        section.te_premium_multiplier,
        section.num_teams,
        section.lineup,
    )?;
    let league = LeagueConfig {
        name: section.name,
        settings,
    };

    // --- engine.toml (required) ---
    let engine_path = config_dir.join("engine.toml");
    let engine_text = read_file(&engine_path)?;
    let engine_file: EngineFile =
        toml::from_str(&engine_text).map_err(|e| ConfigError::ParseError {
            path: engine_path.clone(),
            source: e,
        })?;

    let config = Config {
        league,
        valuation: engine_file.valuation,
        calibration: engine_file.calibration,
        drift: engine_file.drift,
        db_path: engine_file.database.path,
        data_paths: engine_file.data,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        // create_new never clobbers a file the user already edited.
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to the current working directory.
/// Ensures default config files are copied before loading.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    config.league.settings.validate()?;

    let cal = &config.calibration;
    if cal.folds < 2 {
        return Err(invalid(
            "calibration.folds",
            format!("must be at least 2, got {}", cal.folds),
        ));
    }
    if !(cal.step.is_finite() && cal.step > 0.0) {
        return Err(invalid(
            "calibration.step",
            format!("must be > 0, got {}", cal.step),
        ));
    }
    if cal.max_passes == 0 {
        return Err(invalid("calibration.max_passes", "must be > 0"));
    }
    if !(cal.max_drift.is_finite() && cal.max_drift > 0.0) {
        return Err(invalid(
            "calibration.max_drift",
            format!("must be > 0, got {}", cal.max_drift),
        ));
    }
    if cal.rank_shift_top_n == 0 {
        return Err(invalid("calibration.rank_shift_top_n", "must be > 0"));
    }

    let t = &config.drift.thresholds;
    let unit_fields: &[(&str, f64)] = &[
        ("drift.thresholds.correlation_warning", t.correlation_warning),
        ("drift.thresholds.correlation_critical", t.correlation_critical),
        ("drift.thresholds.divergence_warning", t.divergence_warning),
        ("drift.thresholds.divergence_critical", t.divergence_critical),
        ("drift.thresholds.mover_fraction_warning", t.mover_fraction_warning),
        ("drift.thresholds.mover_fraction_critical", t.mover_fraction_critical),
    ];
    for (name, val) in unit_fields {
        if !(0.0..=1.0).contains(val) {
            return Err(invalid(
                name,
                format!("must be between 0.0 and 1.0 inclusive, got {val}"),
            ));
        }
    }
    if t.correlation_critical > t.correlation_warning {
        return Err(invalid(
            "drift.thresholds.correlation_critical",
            "must not be above correlation_warning",
        ));
    }
    if t.divergence_critical < t.divergence_warning {
        return Err(invalid(
            "drift.thresholds.divergence_critical",
            "must not be below divergence_warning",
        ));
    }
    if t.mover_fraction_critical < t.mover_fraction_warning {
        return Err(invalid(
            "drift.thresholds.mover_fraction_critical",
            "must not be below mover_fraction_warning",
        ));
    }
    if config.drift.top_n == 0 {
        return Err(invalid("drift.top_n", "must be > 0"));
    }
    if config.drift.mover_rank_threshold == 0 {
        return Err(invalid("drift.mover_rank_threshold", "must be > 0"));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
