// src/simulation/sampler.rs — Seeded Monte-Carlo sampling of an output distribution

use rand::distributions::{Distribution as _, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Fresh seed when none is configured.
pub fn draw_seed() -> u64 {
    rand::random()
}

/// Histogram of `shots` draws from `probabilities`, or `None` when the
/// weights cannot form a distribution (all zero, negative, non-finite).
pub fn sample_counts(probabilities: &[f64], shots: u64, seed: u64) -> Option<Vec<u64>> {
    let index = WeightedIndex::new(probabilities).ok()?;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut counts = vec![0u64; probabilities.len()];
    for _ in 0..shots {
        counts[index.sample(&mut rng)] += 1;
    }
    Some(counts)
}

/// Binomial standard error of a fraction estimated from `shots` draws.
pub fn standard_error(p: f64, shots: u64) -> f64 {
    if shots == 0 {
        return f64::INFINITY;
    }
    (p * (1.0 - p) / shots as f64).max(0.0).sqrt()
}
