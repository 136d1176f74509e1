// src/rl/policy.rs
//
// Baseline policies for evaluation and trajectory collection.
//
// Learned policies live outside this crate; these exist to exercise the
// environment and to give a reference success rate:
// - RandomPolicy: uniform over actions, seeded per episode
// - ScriptedPolicy: fixed opening sequence, then the first closing action
// - ReadinessPolicy: close when ready, else push the largest threshold gaps

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::ConfigError;
use crate::store::ConfigStore;

use super::observation::Observation;

pub const RANDOM_POLICY_VERSION: &str = "random-v1";
pub const SCRIPTED_POLICY_VERSION: &str = "scripted-v1";
pub const READINESS_POLICY_VERSION: &str = "readiness-v1";

/// Mixed into the episode seed so policy draws are independent of the
/// environment's stream.
const POLICY_SEED_SALT: u64 = 0xA076_1D64_78BD_642F;

/// Discrete-action policy.
pub trait Policy: Send {
    /// Unique version string for this policy implementation.
    fn version(&self) -> &str;

    /// Reset the policy for a new episode.
    fn reset_episode(&mut self, seed: u64, episode_id: u64);

    /// Choose an action index in `0..store.action_count()`.
    fn act(&mut self, obs: &Observation, store: &ConfigStore) -> usize;
}

impl<P: Policy + ?Sized> Policy for Box<P> {
    fn version(&self) -> &str {
        (**self).version()
    }

    fn reset_episode(&mut self, seed: u64, episode_id: u64) {
        (**self).reset_episode(seed, episode_id)
    }

    fn act(&mut self, obs: &Observation, store: &ConfigStore) -> usize {
        (**self).act(obs, store)
    }
}

/// Uniformly random actions.
#[derive(Debug, Clone)]
pub struct RandomPolicy {
    rng: ChaCha8Rng,
}

impl RandomPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed ^ POLICY_SEED_SALT),
        }
    }
}

impl Policy for RandomPolicy {
    fn version(&self) -> &str {
        RANDOM_POLICY_VERSION
    }

    fn reset_episode(&mut self, seed: u64, _episode_id: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed ^ POLICY_SEED_SALT);
    }

    fn act(&mut self, _obs: &Observation, store: &ConfigStore) -> usize {
        self.rng.gen_range(0..store.action_count())
    }
}

/// Plays `script` in order, then the first closing action forever.
#[derive(Debug, Clone)]
pub struct ScriptedPolicy {
    script: Vec<usize>,
    cursor: usize,
}

impl ScriptedPolicy {
    pub fn new(script: Vec<usize>) -> Self {
        Self { script, cursor: 0 }
    }

    /// Build from action ids, failing on unknown ids.
    pub fn from_ids<S: AsRef<str>>(store: &ConfigStore, ids: &[S]) -> Result<Self, ConfigError> {
        let script = ids
            .iter()
            .map(|id| {
                let id = id.as_ref();
                store.action_index(id).ok_or_else(|| ConfigError::UnknownAction {
                    context: "script".to_string(),
                    action_id: id.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(script))
    }
}

impl Policy for ScriptedPolicy {
    fn version(&self) -> &str {
        SCRIPTED_POLICY_VERSION
    }

    fn reset_episode(&mut self, _seed: u64, _episode_id: u64) {
        self.cursor = 0;
    }

    fn act(&mut self, _obs: &Observation, store: &ConfigStore) -> usize {
        let action = self
            .script
            .get(self.cursor)
            .copied()
            .unwrap_or_else(|| store.closing_actions()[0]);
        self.cursor += 1;
        action
    }
}

/// Greedy heuristic over the persona's effective effect table.
///
/// If every ready threshold is met, close. Otherwise score each non-closing
/// action by `sum(gap[t] * effective_effect[a][t])` over the traits still
/// below threshold and take the best (lowest index on ties). Falls back to
/// closing when no action makes progress.
#[derive(Debug, Clone, Default)]
pub struct ReadinessPolicy;

impl ReadinessPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl Policy for ReadinessPolicy {
    fn version(&self) -> &str {
        READINESS_POLICY_VERSION
    }

    fn reset_episode(&mut self, _seed: u64, _episode_id: u64) {}

    fn act(&mut self, obs: &Observation, store: &ConfigStore) -> usize {
        let close = store.closing_actions()[0];
        let psychology = obs.trait_values();
        let gaps = crate::scoring::trait_gaps(store, &psychology);
        if gaps.is_empty() {
            return close;
        }
        let Some(persona) = store.persona(obs.persona_index) else {
            return close;
        };
        let stage = store.stage_index_for_turn(obs.turn);

        let mut best: Option<(usize, f64)> = None;
        for (a, spec) in store.actions().iter().enumerate() {
            if spec.closing {
                continue;
            }
            let stage_mult = stage
                .and_then(|s| store.stages().get(s))
                .map(|s| s.multipliers[a])
                .unwrap_or(1.0);
            let scale = spec.effectiveness * persona.action_affinity[a] * stage_mult;
            let score: f64 = gaps
                .iter()
                .map(|&(t, gap)| gap * spec.effects[t] * persona.trait_weights[t] * scale)
                .sum();
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((a, score));
            }
        }
        match best {
            Some((a, score)) if score > 0.0 => a,
            _ => close,
        }
    }
}
