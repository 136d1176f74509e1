// src/rl/runner.rs
//
// Episode runner and batch evaluation.
//
// - run_episode: drive one episode with a policy until it ends
// - evaluate: many episodes, optionally across threads, with aggregate stats
//
// Threaded evaluation is deterministic: each episode's seed depends only on
// (base_seed, episode index), each worker owns its own environment and
// policy, and results are reassembled in episode order. `threads = 1` and
// `threads = N` give identical summaries.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::EnvError;
use crate::store::ConfigStore;
use crate::termination::EpisodePhase;

use super::env::ConversationEnv;
use super::policy::Policy;

/// Stride between consecutive episode seeds.
pub const EPISODE_SEED_STRIDE: u64 = 12_345;

/// Seed for episode `index` of a run starting at `base_seed`.
pub fn episode_seed(base_seed: u64, index: u64) -> u64 {
    base_seed.wrapping_add(index.wrapping_mul(EPISODE_SEED_STRIDE))
}

/// Configuration for a single episode.
#[derive(Debug, Clone, Default)]
pub struct EpisodeConfig {
    /// Seed for the episode RNG stream.
    pub seed: u64,
    /// Episode ID for logging.
    pub episode_id: u64,
    /// Force a persona instead of drawing one.
    pub persona: Option<String>,
}

/// Summary of a completed episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub episode_id: u64,
    pub seed: u64,
    pub persona_id: String,
    pub outcome: EpisodePhase,
    pub turns: u32,
    pub total_reward: f64,
    /// Action ids in the order taken.
    pub actions: Vec<usize>,
    pub final_readiness: f64,
}

/// Run one episode to completion.
///
/// Bounded by `max_turns`: every accepted step advances the turn counter.
pub fn run_episode(
    env: &mut ConversationEnv,
    policy: &mut dyn Policy,
    config: &EpisodeConfig,
) -> Result<EpisodeSummary, EnvError> {
    let reset = env.reset(Some(config.seed), config.persona.as_deref())?;
    policy.reset_episode(config.seed, config.episode_id);

    let mut obs = reset.observation;
    let mut total_reward = 0.0;
    let final_readiness = loop {
        let action = policy.act(&obs, env.store());
        let result = env.step(action)?;
        total_reward += result.reward;
        let readiness = result.info.readiness;
        let done = result.done();
        obs = result.observation;
        if done {
            break readiness;
        }
    };

    let state = env.state();
    Ok(EpisodeSummary {
        episode_id: config.episode_id,
        seed: config.seed,
        persona_id: obs.persona_id,
        outcome: state.phase,
        turns: state.turn,
        total_reward,
        actions: state.history.clone(),
        final_readiness,
    })
}

/// Batch evaluation settings.
#[derive(Debug, Clone)]
pub struct EvalConfig {
    pub episodes: u32,
    pub base_seed: u64,
    /// Worker threads (clamped to [1, episodes]).
    pub threads: usize,
    /// Force a persona for every episode.
    pub persona: Option<String>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            episodes: 100,
            base_seed: 0,
            threads: 1,
            persona: None,
        }
    }
}

/// Per-persona breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaEval {
    pub persona_id: String,
    pub episodes: u32,
    pub successes: u32,
    pub success_rate: f64,
    pub mean_turns: f64,
}

/// Aggregate evaluation results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalSummary {
    pub config_name: String,
    pub config_fingerprint: String,
    pub policy_version: String,
    pub base_seed: u64,
    pub episodes: u32,
    pub successes: u32,
    pub timeouts: u32,
    pub success_rate: f64,
    pub timeout_rate: f64,
    pub mean_turns: f64,
    pub mean_reward: f64,
    /// Action id -> times taken, across all episodes.
    pub action_counts: BTreeMap<String, u64>,
    /// In config persona order; personas never drawn are omitted.
    pub per_persona: Vec<PersonaEval>,
}

impl EvalSummary {
    /// Aggregate episode summaries.
    pub fn from_episodes(
        store: &ConfigStore,
        policy_version: &str,
        base_seed: u64,
        episodes: &[EpisodeSummary],
    ) -> Self {
        let n = episodes.len() as u32;
        let successes = episodes
            .iter()
            .filter(|e| e.outcome == EpisodePhase::Success)
            .count() as u32;
        let timeouts = episodes
            .iter()
            .filter(|e| e.outcome == EpisodePhase::Timeout)
            .count() as u32;

        let mut action_counts: BTreeMap<String, u64> = store
            .actions()
            .iter()
            .map(|a| (a.id.clone(), 0))
            .collect();
        for e in episodes {
            for &a in &e.actions {
                if let Some(spec) = store.action(a) {
                    *action_counts.entry(spec.id.clone()).or_insert(0) += 1;
                }
            }
        }

        let per_persona = store
            .personas()
            .iter()
            .filter_map(|p| {
                let mine: Vec<&EpisodeSummary> =
                    episodes.iter().filter(|e| e.persona_id == p.id).collect();
                if mine.is_empty() {
                    return None;
                }
                let count = mine.len() as u32;
                let wins = mine
                    .iter()
                    .filter(|e| e.outcome == EpisodePhase::Success)
                    .count() as u32;
                Some(PersonaEval {
                    persona_id: p.id.clone(),
                    episodes: count,
                    successes: wins,
                    success_rate: ratio(wins as f64, count as f64),
                    mean_turns: ratio(
                        mine.iter().map(|e| e.turns as f64).sum(),
                        count as f64,
                    ),
                })
            })
            .collect();

        Self {
            config_name: store.name().to_string(),
            config_fingerprint: store.fingerprint().to_string(),
            policy_version: policy_version.to_string(),
            base_seed,
            episodes: n,
            successes,
            timeouts,
            success_rate: ratio(successes as f64, n as f64),
            timeout_rate: ratio(timeouts as f64, n as f64),
            mean_turns: ratio(episodes.iter().map(|e| e.turns as f64).sum(), n as f64),
            mean_reward: ratio(episodes.iter().map(|e| e.total_reward).sum(), n as f64),
            action_counts,
            per_persona,
        }
    }

    /// Log a one-line summary.
    pub fn log(&self) {
        tracing::info!(
            config = %self.config_name,
            policy = %self.policy_version,
            episodes = self.episodes,
            success_rate = self.success_rate,
            timeout_rate = self.timeout_rate,
            mean_turns = self.mean_turns,
            mean_reward = self.mean_reward,
            "evaluation summary"
        );
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

/// Run `config.episodes` episodes, building one policy per worker.
///
/// Returns the aggregate summary and per-episode summaries in episode order.
pub fn evaluate<F, P>(
    store: Arc<ConfigStore>,
    make_policy: F,
    config: &EvalConfig,
) -> Result<(EvalSummary, Vec<EpisodeSummary>), EnvError>
where
    F: Fn() -> P + Sync,
    P: Policy,
{
    let total = config.episodes as u64;
    let threads = config.threads.clamp(1, (total as usize).max(1));
    let policy_version = make_policy().version().to_string();

    let run_range = |range: std::ops::Range<u64>| -> Result<Vec<EpisodeSummary>, EnvError> {
        let mut env = ConversationEnv::new(Arc::clone(&store), config.base_seed);
        let mut policy = make_policy();
        range
            .map(|i| {
                let ep = EpisodeConfig {
                    seed: episode_seed(config.base_seed, i),
                    episode_id: i,
                    persona: config.persona.clone(),
                };
                run_episode(&mut env, &mut policy, &ep)
            })
            .collect()
    };

    let episodes: Vec<EpisodeSummary> = if threads == 1 {
        run_range(0..total)?
    } else {
        let chunk = total.div_ceil(threads as u64);
        let chunks: Vec<Result<Vec<EpisodeSummary>, EnvError>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..threads as u64)
                .map(|t| {
                    let start = (t * chunk).min(total);
                    let end = ((t + 1) * chunk).min(total);
                    let run_range = &run_range;
                    s.spawn(move || run_range(start..end))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(r) => r,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        });
        let mut out = Vec::with_capacity(total as usize);
        for chunk in chunks {
            out.extend(chunk?);
        }
        out
    };

    let summary = EvalSummary::from_episodes(&store, &policy_version, config.base_seed, &episodes);
    summary.log();
    Ok((summary, episodes))
}
