// src/rl/env.rs
//
// Gym-style conversation environment.
//
// - ConversationEnv: one in-flight episode (reset, step)
// - VecEnv: N independent environments over one shared ConfigStore
//
// All randomness comes from ChaCha8 streams: a per-environment seed stream
// that hands out episode seeds, and a per-episode stream reseeded at every
// reset. Given (seed, persona, action sequence) an episode is reproducible
// byte for byte.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::EnvError;
use crate::scoring;
use crate::state::EpisodeState;
use crate::store::ConfigStore;
use crate::termination::{self, EpisodePhase};
use crate::transcript::Transcript;
use crate::transition;

use super::observation::{encode_observation, observation_dim, Observation, TraitObservation};

/// Stride between per-environment base seeds inside a VecEnv.
pub const VEC_ENV_SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Information returned from a reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetInfo {
    /// Seed of the new episode's RNG stream.
    pub seed: u64,
    pub persona_index: usize,
    pub persona_id: String,
    pub traits: Vec<TraitObservation>,
    /// Mean fraction of ready thresholds reached.
    pub readiness: f64,
    /// Logistic booking probability, if the config has a scoring model.
    pub booking_probability: Option<f64>,
}

/// Result of a reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetResult {
    pub observation: Observation,
    /// Flat encoding of `observation`.
    pub features: Vec<f32>,
    pub info: ResetInfo,
}

/// Additional information returned from a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    /// Turn counter after the step.
    pub turn: u32,
    pub last_action: usize,
    pub last_action_id: String,
    pub persona_id: String,
    /// Stage the action was applied in, if stages are configured.
    pub stage_id: Option<String>,
    pub traits: Vec<TraitObservation>,
    pub readiness: f64,
    pub booking_probability: Option<f64>,
    /// Every ready threshold met after this step.
    pub ready: bool,
    pub outcome: EpisodePhase,
}

/// Result of a single environment step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// The observation after taking the action.
    pub observation: Observation,
    /// Flat encoding of `observation`.
    pub features: Vec<f32>,
    /// Sparse terminal reward.
    pub reward: f64,
    /// Episode ended in success.
    pub terminated: bool,
    /// Episode hit `max_turns`.
    pub truncated: bool,
    pub info: StepInfo,
}

impl StepResult {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Gym-style conversation environment.
///
/// Owns exactly one episode. The config is shared read-only; nothing else is.
#[derive(Debug, Clone)]
pub struct ConversationEnv {
    store: Arc<ConfigStore>,
    /// Hands out episode seeds when reset is called without one.
    seed_rng: ChaCha8Rng,
    /// Episode stream: persona draw, jitter, step noise.
    rng: ChaCha8Rng,
    state: EpisodeState,
}

impl ConversationEnv {
    /// Create an environment and start its first episode.
    ///
    /// The first episode's seed is drawn from `base_seed`'s stream, so
    /// `reset(None, None)` sequences are reproducible per `base_seed`.
    pub fn new(store: Arc<ConfigStore>, base_seed: u64) -> Self {
        let mut seed_rng = ChaCha8Rng::seed_from_u64(base_seed);
        let seed: u64 = seed_rng.gen();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let persona = store.sample_persona(&mut rng);
        let psychology = transition::initial_psychology(&store, persona, &mut rng);
        let state = EpisodeState::new(psychology, persona, store.action_count(), seed);
        Self {
            store,
            seed_rng,
            rng,
            state,
        }
    }

    /// Start a new episode.
    ///
    /// `seed` reseeds the episode stream (drawn from the environment's seed
    /// stream if None). `persona` overrides the weighted persona draw.
    pub fn reset(&mut self, seed: Option<u64>, persona: Option<&str>) -> Result<ResetResult, EnvError> {
        // Resolve the override before touching any state.
        let forced = match persona {
            Some(id) => Some(
                self.store
                    .persona_index(id)
                    .ok_or_else(|| EnvError::UnknownPersona(id.to_string()))?,
            ),
            None => None,
        };

        let seed = seed.unwrap_or_else(|| self.seed_rng.gen());
        self.rng = ChaCha8Rng::seed_from_u64(seed);

        let persona = match forced {
            Some(p) => p,
            None => self.store.sample_persona(&mut self.rng),
        };
        let psychology = transition::initial_psychology(&self.store, persona, &mut self.rng);
        self.state = EpisodeState::new(psychology, persona, self.store.action_count(), seed);

        let observation = Observation::from_state(&self.store, &self.state);
        let features = encode_observation(&self.store, &self.state);
        let info = ResetInfo {
            seed,
            persona_index: persona,
            persona_id: observation.persona_id.clone(),
            traits: observation.traits.clone(),
            readiness: scoring::readiness(&self.store, &self.state.psychology),
            booking_probability: scoring::booking_probability(&self.store, &self.state.psychology),
        };

        tracing::debug!(
            seed,
            persona = %info.persona_id,
            readiness = info.readiness,
            "episode reset"
        );

        Ok(ResetResult {
            observation,
            features,
            info,
        })
    }

    /// Check that `action` would be accepted, without side effects.
    pub fn check_step(&self, action: usize) -> Result<(), EnvError> {
        if self.state.phase.is_terminal() {
            return Err(EnvError::EpisodeEnded {
                turn: self.state.turn,
                phase: self.state.phase,
            });
        }
        if action >= self.store.action_count() {
            return Err(EnvError::InvalidAction {
                action,
                action_count: self.store.action_count(),
            });
        }
        Ok(())
    }

    /// Take one action.
    ///
    /// On error the episode state (psychology, turn, history, phase) is
    /// unchanged.
    pub fn step(&mut self, action: usize) -> Result<StepResult, EnvError> {
        self.check_step(action)?;

        let store = &self.store;
        let stage = store.stage_index_for_turn(self.state.turn);
        let deltas =
            transition::compute_deltas(store, self.state.persona, action, stage, &mut self.rng)?;
        let next = transition::apply_deltas(store, &self.state.psychology, &deltas)?;
        self.state.commit(action, next);

        let phase = termination::evaluate(store, &self.state.psychology, action, self.state.turn);
        self.state.phase = phase;
        let reward = termination::reward(store, phase);

        let observation = Observation::from_state(store, &self.state);
        let features = encode_observation(store, &self.state);
        let info = StepInfo {
            turn: self.state.turn,
            last_action: action,
            last_action_id: store.action(action).map(|a| a.id.clone()).unwrap_or_default(),
            persona_id: observation.persona_id.clone(),
            stage_id: stage.and_then(|s| store.stages().get(s)).map(|s| s.id.clone()),
            traits: observation.traits.clone(),
            readiness: scoring::readiness(store, &self.state.psychology),
            booking_probability: scoring::booking_probability(store, &self.state.psychology),
            ready: termination::is_ready(store, &self.state.psychology),
            outcome: phase,
        };

        tracing::debug!(
            turn = info.turn,
            action = %info.last_action_id,
            readiness = info.readiness,
            phase = %phase,
            "step"
        );
        if phase.is_terminal() {
            tracing::debug!(
                seed = self.state.seed,
                persona = %info.persona_id,
                turns = info.turn,
                outcome = %phase,
                reward,
                "episode ended"
            );
        }

        Ok(StepResult {
            observation,
            features,
            reward,
            terminated: phase.terminated(),
            truncated: phase.truncated(),
            info,
        })
    }

    /// Number of discrete actions.
    pub fn action_space_size(&self) -> usize {
        self.store.action_count()
    }

    /// Shape of the flat feature vector.
    pub fn observation_shape(&self) -> [usize; 1] {
        [observation_dim(&self.store)]
    }

    /// Current structured observation.
    pub fn observation(&self) -> Observation {
        Observation::from_state(&self.store, &self.state)
    }

    /// Read-only summary of the current (or just finished) episode.
    pub fn transcript(&self) -> Transcript {
        Transcript::from_state(&self.store, &self.state)
    }

    pub fn state(&self) -> &EpisodeState {
        &self.state
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    pub fn seed(&self) -> u64 {
        self.state.seed
    }

    pub fn turn(&self) -> u32 {
        self.state.turn
    }

    pub fn is_done(&self) -> bool {
        self.state.is_done()
    }
}

/// Vectorised environments for batched rollouts.
#[derive(Debug, Clone)]
pub struct VecEnv {
    /// Individual environments.
    envs: Vec<ConversationEnv>,
}

impl VecEnv {
    /// Create `n` environments sharing `store`.
    ///
    /// Environment `i` uses base seed `base_seed + i * VEC_ENV_SEED_STRIDE`.
    pub fn new(store: Arc<ConfigStore>, n: usize, base_seed: u64) -> Self {
        let envs = (0..n)
            .map(|i| {
                let seed = base_seed.wrapping_add((i as u64).wrapping_mul(VEC_ENV_SEED_STRIDE));
                ConversationEnv::new(Arc::clone(&store), seed)
            })
            .collect();
        Self { envs }
    }

    pub fn num_envs(&self) -> usize {
        self.envs.len()
    }

    pub fn envs(&self) -> &[ConversationEnv] {
        &self.envs
    }

    pub fn env(&self, i: usize) -> Option<&ConversationEnv> {
        self.envs.get(i)
    }

    /// Reset all environments with optional per-environment seeds.
    ///
    /// If seeds has fewer elements than envs, remaining envs draw their own.
    pub fn reset_all(&mut self, seeds: Option<&[u64]>) -> Result<Vec<ResetResult>, EnvError> {
        if let Some(s) = seeds {
            if s.len() > self.envs.len() {
                return Err(EnvError::BatchSize {
                    expected: self.envs.len(),
                    got: s.len(),
                });
            }
        }
        self.envs
            .iter_mut()
            .enumerate()
            .map(|(i, env)| {
                let seed = seeds.and_then(|s| s.get(i).copied());
                env.reset(seed, None)
            })
            .collect()
    }

    /// Step every environment.
    ///
    /// All actions are validated first; if any is rejected no environment
    /// is stepped.
    pub fn step(&mut self, actions: &[usize]) -> Result<Vec<StepResult>, EnvError> {
        if actions.len() != self.envs.len() {
            return Err(EnvError::BatchSize {
                expected: self.envs.len(),
                got: actions.len(),
            });
        }
        for (env, &action) in self.envs.iter().zip(actions) {
            env.check_step(action)?;
        }
        self.envs
            .iter_mut()
            .zip(actions)
            .map(|(env, &action)| env.step(action))
            .collect()
    }

    /// Step only the environments given `Some(action)`; `None` slots are
    /// left untouched and yield `None`.
    ///
    /// Validation is all-or-nothing, as in [`VecEnv::step`].
    pub fn step_active(
        &mut self,
        actions: &[Option<usize>],
    ) -> Result<Vec<Option<StepResult>>, EnvError> {
        if actions.len() != self.envs.len() {
            return Err(EnvError::BatchSize {
                expected: self.envs.len(),
                got: actions.len(),
            });
        }
        for (env, action) in self.envs.iter().zip(actions) {
            if let Some(a) = action {
                env.check_step(*a)?;
            }
        }
        self.envs
            .iter_mut()
            .zip(actions)
            .map(|(env, action)| action.map(|a| env.step(a)).transpose())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Preset;
    use crate::testkit::shared_scenario_store;

    #[test]
    fn reset_starts_clean() {
        let mut env = ConversationEnv::new(shared_scenario_store(), 1);
        let r = env.reset(Some(3), Some("cautious")).unwrap();
        assert_eq!(r.observation.turn, 0);
        assert!(env.state().history.is_empty());
        assert!(!env.state().terminated() && !env.state().truncated());
        assert_eq!(r.info.persona_id, "cautious");
        assert_eq!(r.info.seed, 3);
        assert_eq!(r.features.len(), env.observation_shape()[0]);
    }

    #[test]
    fn scripted_close_succeeds_on_fifth_step() {
        let store = shared_scenario_store();
        let mut env = ConversationEnv::new(Arc::clone(&store), 0);
        env.reset(Some(0), Some("cautious")).unwrap();
        let script = ["pitch", "pitch", "reassure", "secure", "close"];
        let mut last = None;
        for (i, id) in script.iter().enumerate() {
            let a = store.action_index(id).unwrap();
            let r = env.step(a).unwrap();
            if i < 4 {
                assert!(!r.done());
                assert_eq!(r.reward, 0.0);
            }
            last = Some(r);
        }
        let r = last.unwrap();
        assert!(r.terminated && !r.truncated);
        assert_eq!(r.reward, 1.0);
        assert_eq!(r.info.turn, 5);
        assert!(r.info.ready);
        assert_eq!(
            env.step(0),
            Err(EnvError::EpisodeEnded {
                turn: 5,
                phase: EpisodePhase::Success
            })
        );
    }

    #[test]
    fn invalid_action_leaves_state_untouched() {
        let mut env = ConversationEnv::new(shared_scenario_store(), 2);
        env.reset(Some(1), None).unwrap();
        env.step(0).unwrap();
        let before = env.state().clone();
        assert_eq!(
            env.step(4),
            Err(EnvError::InvalidAction {
                action: 4,
                action_count: 4
            })
        );
        assert_eq!(env.state(), &before);
    }

    #[test]
    fn unknown_persona_is_rejected_before_reset() {
        let mut env = ConversationEnv::new(shared_scenario_store(), 2);
        env.step(0).unwrap();
        let before = env.state().clone();
        assert_eq!(
            env.reset(None, Some("nobody")),
            Err(EnvError::UnknownPersona("nobody".into()))
        );
        assert_eq!(env.state(), &before);
    }

    #[test]
    fn stage_is_reported_for_staged_configs() {
        let store = Arc::new(ConfigStore::from_preset(Preset::Prompt).unwrap());
        let mut env = ConversationEnv::new(Arc::clone(&store), 0);
        env.reset(Some(9), None).unwrap();
        let r = env.step(0).unwrap();
        assert_eq!(r.info.stage_id.as_deref(), Some("early"));
        assert_eq!(r.info.booking_probability, None);
    }

    #[test]
    fn vec_env_rejects_whole_batch_on_one_bad_action() {
        let mut venv = VecEnv::new(shared_scenario_store(), 3, 10);
        venv.reset_all(Some(&[1_u64, 2, 3][..])).unwrap();
        let err = venv.step(&[0, 9, 0]).unwrap_err();
        assert!(matches!(err, EnvError::InvalidAction { action: 9, .. }));
        assert!(venv.envs().iter().all(|e| e.turn() == 0));

        assert_eq!(
            venv.step(&[0, 0]).unwrap_err(),
            EnvError::BatchSize {
                expected: 3,
                got: 2
            }
        );
        let results = venv.step(&[0, 1, 2]).unwrap();
        assert_eq!(results.len(), 3);
        assert!(venv.envs().iter().all(|e| e.turn() == 1));
    }

    #[test]
    fn step_active_skips_idle_slots() {
        let mut venv = VecEnv::new(shared_scenario_store(), 3, 4);
        venv.reset_all(None).unwrap();
        let out = venv.step_active(&[Some(0), None, Some(1)]).unwrap();
        assert!(out[0].is_some() && out[1].is_none() && out[2].is_some());
        let turns: Vec<u32> = venv.envs().iter().map(|e| e.turn()).collect();
        assert_eq!(turns, vec![1, 0, 1]);
        assert!(venv.step_active(&[None, Some(7), None]).is_err());
        assert_eq!(venv.env(1).map(|e| e.turn()), Some(0));
    }

    #[test]
    fn vec_env_members_draw_distinct_seeds() {
        let mut venv = VecEnv::new(shared_scenario_store(), 4, 0);
        let resets = venv.reset_all(None).unwrap();
        let mut seeds: Vec<u64> = resets.iter().map(|r| r.info.seed).collect();
        seeds.sort_unstable();
        seeds.dedup();
        assert_eq!(seeds.len(), 4);
    }
}
