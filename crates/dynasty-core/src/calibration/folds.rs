// Stratified k-fold assignment by position and career stage.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

use crate::model::{PlayerRecord, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AgeBand {
    Young,
    Prime,
    Veteran,
}

/// First age of the prime and veteran bands for each position.
fn band_cutoffs(position: Position) -> (u32, u32) {
    match position {
        Position::Quarterback => (26, 32),
        Position::RunningBack => (24, 27),
        Position::WideReceiver => (25, 29),
        Position::TightEnd => (25, 30),
    }
}

/// Career stage for stratification. Unknown ages are placed in the prime
/// band.
pub fn age_band(position: Position, age: Option<u32>) -> AgeBand {
    let Some(age) = age else {
        return AgeBand::Prime;
    };
    let (prime, veteran) = band_cutoffs(position);
    if age < prime {
        AgeBand::Young
    } else if age < veteran {
        AgeBand::Prime
    } else {
        AgeBand::Veteran
    }
}

/// Split `players` into `k` folds of indices.
///
/// Each position x age-band stratum is shuffled with a seeded RNG and dealt
/// round-robin. The dealing offset carries over between strata so remainder
/// players do not pile into the first fold. The same seed and input order
/// always give the same folds.
pub fn stratified_folds(players: &[PlayerRecord], k: usize, seed: u64) -> Vec<Vec<usize>> {
    let k = k.max(1);
    let mut strata: BTreeMap<(Position, AgeBand), Vec<usize>> = BTreeMap::new();
    for (idx, p) in players.iter().enumerate() {
        strata
            .entry((p.position, age_band(p.position, p.age)))
            .or_default()
            .push(idx);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut folds = vec![Vec::new(); k];
    let mut offset = 0;
    for members in strata.values_mut() {
        members.sort_by(|&a, &b| players[a].id.cmp(&players[b].id));
        members.shuffle(&mut rng);
        for (i, &idx) in members.iter().enumerate() {
            folds[(offset + i) % k].push(idx);
        }
        offset = (offset + members.len()) % k;
    }
    for fold in &mut folds {
        fold.sort_unstable();
    }
    folds
}
