// src/transition.rs
//
// Psychology dynamics.
//
//   delta[t] = effect[a][t] * effectiveness[a] * trait_weight[p][t]
//              * affinity[p][a] * stage_multiplier[s][a] + noise[t]
//   next[t]  = clip(psychology[t] + delta[t], 0, 1)
//
// Noise is drawn once per trait per step from the episode RNG, in trait
// order, whether or not the action touches that trait.

use rand::Rng;

use crate::error::EnvError;
use crate::store::ConfigStore;

/// Starting psychology for a persona: base plus reset jitter, clipped.
///
/// An out-of-range persona index falls back to the first persona.
pub fn initial_psychology<R: Rng + ?Sized>(
    store: &ConfigStore,
    persona: usize,
    rng: &mut R,
) -> Vec<f64> {
    let Some(spec) = store.persona(persona).or_else(|| store.persona(0)) else {
        return vec![0.0; store.trait_count()];
    };
    let jitter = store.noise().initial;
    spec.base
        .iter()
        .map(|v| (v + jitter.sample(rng)).clamp(0.0, 1.0))
        .collect()
}

/// Deltas for taking `action` as `persona` during `stage`, noise included.
pub fn compute_deltas<R: Rng + ?Sized>(
    store: &ConfigStore,
    persona: usize,
    action: usize,
    stage: Option<usize>,
    rng: &mut R,
) -> Result<Vec<f64>, EnvError> {
    let (Some(spec), Some(p)) = (store.action(action), store.persona(persona)) else {
        return Err(EnvError::InvalidAction {
            action,
            action_count: store.action_count(),
        });
    };
    let stage_mult = stage
        .and_then(|s| store.stages().get(s))
        .map(|s| s.multipliers[action])
        .unwrap_or(1.0);
    let scale = spec.effectiveness * p.action_affinity[action] * stage_mult;
    let mut deltas = vec![0.0; spec.effects.len()];
    store.noise().step.sample_into(rng, &mut deltas);
    for ((delta, effect), weight) in deltas
        .iter_mut()
        .zip(spec.effects.iter())
        .zip(p.trait_weights.iter())
    {
        *delta += effect * weight * scale;
    }
    Ok(deltas)
}

/// Add deltas and clip. Fails without side effects if the result is not a
/// finite point of [0, 1]^n.
pub fn apply_deltas(
    store: &ConfigStore,
    psychology: &[f64],
    deltas: &[f64],
) -> Result<Vec<f64>, EnvError> {
    let candidate: Vec<f64> = psychology
        .iter()
        .zip(deltas.iter())
        .map(|(v, d)| (v + d).clamp(0.0, 1.0))
        .collect();
    verify(store, &candidate)?;
    Ok(candidate)
}

fn verify(store: &ConfigStore, values: &[f64]) -> Result<(), EnvError> {
    // NaN survives clamp.
    for (spec, value) in store.traits().iter().zip(values.iter()) {
        if !value.is_finite() || *value < 0.0 || *value > 1.0 {
            return Err(EnvError::NumericInvariantViolation {
                trait_id: spec.id.clone(),
                value: *value,
            });
        }
    }
    Ok(())
}
