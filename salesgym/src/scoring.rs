// src/scoring.rs
//
// Derived, read-only scores reported in info records and used by the
// readiness baseline. None of these feed the reward.

use crate::store::ConfigStore;

/// Mean fraction of each ready threshold reached, in [0, 1].
///
/// 1.0 exactly when every threshold is met.
pub fn readiness(store: &ConfigStore, psychology: &[f64]) -> f64 {
    let thresholds = store.thresholds();
    if thresholds.is_empty() {
        return 1.0;
    }
    let total: f64 = thresholds
        .iter()
        .map(|t| {
            if t.value <= 0.0 {
                1.0
            } else {
                (psychology[t.trait_index] / t.value).min(1.0)
            }
        })
        .sum();
    total / thresholds.len() as f64
}

/// Logistic booking probability, if the config declares a scoring model.
pub fn booking_probability(store: &ConfigStore, psychology: &[f64]) -> Option<f64> {
    let scoring = store.scoring()?;
    let z = scoring.bias
        + scoring
            .coefficients
            .iter()
            .zip(psychology.iter())
            .map(|(c, v)| c * v)
            .sum::<f64>();
    Some(1.0 / (1.0 + (-z).exp()))
}

/// Thresholded traits still below their threshold, as
/// `(trait_index, shortfall)`, largest shortfall first.
pub fn trait_gaps(store: &ConfigStore, psychology: &[f64]) -> Vec<(usize, f64)> {
    let mut gaps: Vec<(usize, f64)> = store
        .thresholds()
        .iter()
        .filter_map(|t| {
            let gap = t.value - psychology[t.trait_index];
            (gap > 0.0).then_some((t.trait_index, gap))
        })
        .collect();
    gaps.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    gaps
}
