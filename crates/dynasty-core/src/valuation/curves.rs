// Age and risk curves.
//
// Age curves are sparse per-position anchor tables (age -> future-value
// multiplier) with linear interpolation between anchors and clamping outside
// them. The risk table maps roster status to a multiplier on forward value.

use serde::{Deserialize, Serialize};

use crate::model::{PlayerStatus, Position};

// ---------------------------------------------------------------------------
// Age curve
// ---------------------------------------------------------------------------

/// One anchor point on an age curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgeAnchor {
    pub age: u32,
    pub multiplier: f64,
}

/// Sparse age -> multiplier table for a single position. Anchors are kept
/// sorted by age with no duplicate ages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeCurve {
    anchors: Vec<AgeAnchor>,
}

impl AgeCurve {
    /// Build a curve from `(age, multiplier)` pairs. Pairs are sorted by age;
    /// a repeated age keeps the last multiplier given for it.
    pub fn from_pairs(pairs: &[(u32, f64)]) -> Self {
        let mut anchors: Vec<AgeAnchor> = Vec::with_capacity(pairs.len());
        let mut sorted = pairs.to_vec();
        sorted.sort_by_key(|(age, _)| *age);
        for (age, multiplier) in sorted {
            match anchors.last_mut() {
                Some(last) if last.age == age => last.multiplier = multiplier,
                _ => anchors.push(AgeAnchor { age, multiplier }),
            }
        }
        Self { anchors }
    }

    pub fn anchors(&self) -> &[AgeAnchor] {
        &self.anchors
    }

    pub fn anchors_mut(&mut self) -> &mut [AgeAnchor] {
        &mut self.anchors
    }

    /// Multiplier for `age`.
    ///
    /// - unknown age (or an empty table) -> 1.0
    /// - exactly on an anchor -> that anchor's multiplier
    /// - outside the anchor range -> the nearest boundary anchor's multiplier
    /// - between two anchors -> linear interpolation
    pub fn multiplier(&self, age: Option<u32>) -> f64 {
        let Some(age) = age else {
            return 1.0;
        };
        let (Some(first), Some(last)) = (self.anchors.first(), self.anchors.last()) else {
            return 1.0;
        };

        if age <= first.age {
            return first.multiplier;
        }
        if age >= last.age {
            return last.multiplier;
        }

        for pair in self.anchors.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if age == lo.age {
                return lo.multiplier;
            }
            if age < hi.age {
                let t = f64::from(age - lo.age) / f64::from(hi.age - lo.age);
                return lo.multiplier + t * (hi.multiplier - lo.multiplier);
            }
        }
        last.multiplier
    }

    /// Largest multiplier in the table (1.0 for an empty table).
    pub fn max_multiplier(&self) -> f64 {
        self.anchors
            .iter()
            .map(|a| a.multiplier)
            .fold(None, |acc: Option<f64>, m| Some(acc.map_or(m, |a| a.max(m))))
            .unwrap_or(1.0)
    }

    /// Whether the curve never rises at any integer age from `from_age` up
    /// to its last anchor.
    pub fn is_non_increasing_from(&self, from_age: u32) -> bool {
        let Some(last) = self.anchors.last() else {
            return true;
        };
        let mut previous = self.multiplier(Some(from_age));
        for age in (from_age + 1)..=last.age.max(from_age) {
            let current = self.multiplier(Some(age));
            if current > previous + 1e-12 {
                return false;
            }
            previous = current;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Per-position table
// ---------------------------------------------------------------------------

/// One age curve per valued position. A struct field per position rather
/// than a map keyed by position string, so every position always has a curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeCurves {
    pub qb: AgeCurve,
    pub rb: AgeCurve,
    pub wr: AgeCurve,
    pub te: AgeCurve,
}

impl AgeCurves {
    pub fn get(&self, position: Position) -> &AgeCurve {
        match position {
            Position::Quarterback => &self.qb,
            Position::RunningBack => &self.rb,
            Position::WideReceiver => &self.wr,
            Position::TightEnd => &self.te,
        }
    }

    pub fn get_mut(&mut self, position: Position) -> &mut AgeCurve {
        match position {
            Position::Quarterback => &mut self.qb,
            Position::RunningBack => &mut self.rb,
            Position::WideReceiver => &mut self.wr,
            Position::TightEnd => &mut self.te,
        }
    }

    pub fn multiplier(&self, position: Position, age: Option<u32>) -> f64 {
        self.get(position).multiplier(age)
    }
}

impl Default for AgeCurves {
    fn default() -> Self {
        Self {
            qb: AgeCurve::from_pairs(&[
                (21, 1.00),
                (24, 1.08),
                (28, 1.05),
                (32, 0.92),
                (35, 0.75),
                (38, 0.50),
            ]),
            rb: AgeCurve::from_pairs(&[
                (21, 1.10),
                (23, 1.08),
                (25, 1.00),
                (26, 0.95),
                (27, 0.85),
                (28, 0.75),
                (30, 0.55),
                (32, 0.40),
            ]),
            wr: AgeCurve::from_pairs(&[
                (21, 1.10),
                (24, 1.08),
                (27, 1.00),
                (29, 0.90),
                (31, 0.75),
                (33, 0.60),
                (35, 0.45),
            ]),
            te: AgeCurve::from_pairs(&[
                (22, 1.00),
                (25, 1.08),
                (28, 1.02),
                (30, 0.90),
                (32, 0.75),
                (34, 0.60),
            ]),
        }
    }
}

/// Age multiplier from the built-in curves.
pub fn age_multiplier(position: Position, age: Option<u32>) -> f64 {
    AgeCurves::default().multiplier(position, age)
}

// ---------------------------------------------------------------------------
// Risk
// ---------------------------------------------------------------------------

/// Forward-value multiplier for a roster status. Retired players carry no
/// forward value; unrecognized statuses are neutral.
pub fn risk_multiplier(status: PlayerStatus) -> f64 {
    match status {
        PlayerStatus::Active => 1.0,
        PlayerStatus::Questionable => 0.95,
        PlayerStatus::Doubtful => 0.85,
        PlayerStatus::Out => 0.75,
        PlayerStatus::InjuredReserve => 0.60,
        PlayerStatus::Suspended => 0.70,
        PlayerStatus::Retired => 0.0,
        PlayerStatus::Unknown => 1.0,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
