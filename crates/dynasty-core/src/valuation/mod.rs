// Valuation engine: age/risk curves, settings multipliers, composite and
// pick valuation, and the versioned parameter registry.

pub mod adjustments;
pub mod bundle;
pub mod composite;
pub mod curves;
pub mod params;
pub mod pick;
pub mod registry;

pub use adjustments::{compute_settings_adjustments, SettingsAdjustments};
pub use composite::{valuate, valuate_player, RoundedScores, Valuation, ValuationInput};
pub use curves::{age_multiplier, risk_multiplier, AgeCurve, AgeCurves};
pub use params::{BlendWeights, CalibrationParameters, ScoringMultipliers};
pub use pick::pick_value;
pub use registry::{ParameterRegistry, ParameterVersion};
