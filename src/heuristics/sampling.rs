//! Random helpers shared by the constructive heuristics.
//!
//! Every draw goes through an explicit generator; streams for parallel
//! workers are derived from the run seed and a stream index so that results
//! do not depend on scheduling.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Mix a run seed with a stream index (splitmix64 finalizer).
pub fn stream_seed(seed: u64, index: u64) -> u64 {
    let mut z = seed ^ index.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Independent generator for stream `index` of a run
pub fn rng_for(seed: u64, index: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(stream_seed(seed, index))
}

/// Roulette-wheel draw over `(item, weight)` pairs.
///
/// Non-finite and non-positive weights count as zero. If every weight is
/// zero the draw is uniform. Returns `None` only for an empty list.
pub fn weighted_choice<T: Copy, R: Rng>(rng: &mut R, candidates: &[(T, f64)]) -> Option<T> {
    if candidates.is_empty() {
        return None;
    }

    let weight = |w: f64| if w.is_finite() && w > 0.0 { w } else { 0.0 };
    let total: f64 = candidates.iter().map(|&(_, w)| weight(w)).sum();
    if !(total > 0.0) || !total.is_finite() {
        return Some(candidates[rng.gen_range(0..candidates.len())].0);
    }

    let threshold = rng.gen::<f64>() * total;
    let mut cumulative = 0.0;
    for &(item, w) in candidates {
        cumulative += weight(w);
        if cumulative > threshold {
            return Some(item);
        }
    }

    // rounding left the threshold past the last positive weight
    candidates.iter().rev().find(|&&(_, w)| weight(w) > 0.0).map(|&(item, _)| item)
}
