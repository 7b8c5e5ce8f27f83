//! Shuffling and train/validation splitting.

use crate::types::DrivingLog;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::ops::Range;

/// Seeded RNG when `seed` is set, otherwise seeded from the thread RNG.
pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    }
}

/// Apply one random permutation to the rows of `log`.
pub fn shuffle_rows<R: Rng + ?Sized>(log: &mut DrivingLog, rng: &mut R) {
    log.rows_mut().shuffle(rng);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationSplit {
    pub train: Range<usize>,
    pub val: Range<usize>,
}

/// Hold out the trailing `val_fraction` of `len` samples for validation.
///
/// The boundary is `floor(len * (1 - val_fraction))`, so the validation tail
/// rounds up.
pub fn validation_split(len: usize, val_fraction: f32) -> ValidationSplit {
    // Snap to 6 decimals so 0.2f32 behaves like 0.2 rather than 0.20000000298.
    let fraction = (f64::from(val_fraction.clamp(0.0, 1.0)) * 1e6).round() / 1e6;
    let keep = (1.0 - fraction) * len as f64;
    let split_at = (keep.floor() as usize).min(len);
    ValidationSplit {
        train: 0..split_at,
        val: split_at..len,
    }
}
