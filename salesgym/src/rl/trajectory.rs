// src/rl/trajectory.rs
//
// Trajectory collection for behaviour cloning and offline RL.
//
// - TrajectoryRecord: one (obs, action, reward, terminated, truncated) transition
// - TrajectoryCollector: batched rollouts over a VecEnv, one policy per slot
// - TrajectoryWriter: metadata.json + trajectories.jsonl
//
// Episode `i` uses seed `episode_seed(base_seed, i)`, the same seed the
// evaluator gives it, so a collected episode replays exactly under `evaluate`
// with the same policy.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::EnvError;
use crate::store::ConfigStore;

use super::env::VecEnv;
use super::observation::{feature_names, observation_dim, OBS_VERSION};
use super::policy::Policy;
use super::runner::episode_seed;

/// Current trajectory format version.
/// Increment when changing the record schema.
pub const TRAJECTORY_VERSION: u32 = 1;

pub const METADATA_FILE: &str = "metadata.json";
pub const RECORDS_FILE: &str = "trajectories.jsonl";

/// A single transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryRecord {
    /// Flat features of the observation the action was chosen from.
    pub obs_features: Vec<f32>,
    pub action: usize,
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
    pub episode_idx: u32,
    pub step_idx: u32,
    /// Seed of the episode this transition belongs to.
    pub seed: u64,
}

/// Metadata for a trajectory dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryMetadata {
    pub trajectory_version: u32,
    pub obs_version: u32,
    pub policy_version: String,
    pub config_name: String,
    /// `sha256:` digest of the config the data was collected under.
    pub config_fingerprint: String,
    pub base_seed: u64,
    pub num_episodes: u32,
    pub num_transitions: u64,
    pub obs_dim: usize,
    pub action_dim: usize,
    pub feature_names: Vec<String>,
    pub action_ids: Vec<String>,
    pub max_turns: u32,
    /// Unix seconds.
    pub collected_at: u64,
    pub success_rate: f64,
    pub mean_episode_length: f64,
    pub mean_reward: f64,
}

/// Collects trajectories from policy rollouts.
pub struct TrajectoryCollector {
    store: Arc<ConfigStore>,
    num_envs: usize,
    base_seed: u64,
}

impl TrajectoryCollector {
    pub fn new(store: Arc<ConfigStore>, num_envs: usize, base_seed: u64) -> Self {
        Self {
            store,
            num_envs: num_envs.max(1),
            base_seed,
        }
    }

    /// Collect `num_episodes` episodes, building one policy per env slot.
    pub fn collect<F, P>(
        &self,
        num_episodes: u32,
        make_policy: F,
    ) -> Result<(Vec<TrajectoryRecord>, TrajectoryMetadata), EnvError>
    where
        F: Fn() -> P,
        P: Policy,
    {
        let mut vec_env = VecEnv::new(Arc::clone(&self.store), self.num_envs, self.base_seed);
        let mut policies: Vec<P> = (0..self.num_envs).map(|_| make_policy()).collect();
        let policy_version = make_policy().version().to_string();

        let mut records = Vec::new();
        let mut successes = 0_u32;
        let mut total_reward = 0.0_f64;
        let mut episode_lengths: Vec<u32> = Vec::new();
        let mut next_episode = 0_u32;

        while next_episode < num_episodes {
            let batch = (num_episodes - next_episode).min(self.num_envs as u32) as usize;
            let seeds: Vec<u64> = (0..batch)
                .map(|i| episode_seed(self.base_seed, (next_episode as usize + i) as u64))
                .collect();
            let resets = vec_env.reset_all(Some(&seeds))?;

            let mut obs: Vec<_> = resets.into_iter().map(|r| (r.observation, r.features)).collect();
            let mut step_idx = vec![0_u32; self.num_envs];
            let mut active: Vec<bool> = (0..self.num_envs).map(|i| i < batch).collect();
            for (i, policy) in policies.iter_mut().enumerate().take(batch) {
                policy.reset_episode(seeds[i], (next_episode as usize + i) as u64);
            }

            while active.iter().any(|&a| a) {
                let actions: Vec<Option<usize>> = (0..self.num_envs)
                    .map(|i| active[i].then(|| policies[i].act(&obs[i].0, &self.store)))
                    .collect();
                let results = vec_env.step_active(&actions)?;

                for (i, result) in results.into_iter().enumerate() {
                    let (Some(result), Some(action)) = (result, actions[i]) else {
                        continue;
                    };
                    records.push(TrajectoryRecord {
                        obs_features: std::mem::take(&mut obs[i].1),
                        action,
                        reward: result.reward as f32,
                        terminated: result.terminated,
                        truncated: result.truncated,
                        episode_idx: next_episode + i as u32,
                        step_idx: step_idx[i],
                        seed: seeds[i],
                    });
                    step_idx[i] += 1;
                    total_reward += result.reward;

                    if result.done() {
                        active[i] = false;
                        episode_lengths.push(step_idx[i]);
                        if result.terminated {
                            successes += 1;
                        }
                    }
                    obs[i] = (result.observation, result.features);
                }
            }

            next_episode += batch as u32;
        }

        let n = num_episodes as f64;
        let mean = |x: f64| if num_episodes > 0 { x / n } else { 0.0 };
        let metadata = TrajectoryMetadata {
            trajectory_version: TRAJECTORY_VERSION,
            obs_version: OBS_VERSION,
            policy_version,
            config_name: self.store.name().to_string(),
            config_fingerprint: self.store.fingerprint().to_string(),
            base_seed: self.base_seed,
            num_episodes,
            num_transitions: records.len() as u64,
            obs_dim: observation_dim(&self.store),
            action_dim: self.store.action_count(),
            feature_names: feature_names(&self.store),
            action_ids: self.store.actions().iter().map(|a| a.id.clone()).collect(),
            max_turns: self.store.max_turns(),
            collected_at: unix_now(),
            success_rate: mean(successes as f64),
            mean_episode_length: mean(episode_lengths.iter().map(|&l| l as f64).sum()),
            mean_reward: mean(total_reward),
        };

        tracing::info!(
            episodes = num_episodes,
            transitions = metadata.num_transitions,
            success_rate = metadata.success_rate,
            "trajectories collected"
        );
        Ok((records, metadata))
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Writes trajectory data to a directory.
pub struct TrajectoryWriter {
    output_dir: PathBuf,
}

impl TrajectoryWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write records and metadata.
    ///
    /// Creates:
    /// - {output_dir}/metadata.json - pretty JSON metadata
    /// - {output_dir}/trajectories.jsonl - one record per line
    pub fn write(&self, records: &[TrajectoryRecord], metadata: &TrajectoryMetadata) -> io::Result<()> {
        fs::create_dir_all(&self.output_dir)?;

        let metadata_json = serde_json::to_string_pretty(metadata).map_err(invalid_data)?;
        fs::write(self.output_dir.join(METADATA_FILE), metadata_json)?;

        let mut out = BufWriter::new(File::create(self.output_dir.join(RECORDS_FILE))?);
        for record in records {
            serde_json::to_writer(&mut out, record).map_err(invalid_data)?;
            out.write_all(b"\n")?;
        }
        out.flush()
    }
}

/// Read a dataset written by [`TrajectoryWriter`].
pub fn read_trajectories(dir: impl AsRef<Path>) -> io::Result<(Vec<TrajectoryRecord>, TrajectoryMetadata)> {
    let dir = dir.as_ref();
    let metadata: TrajectoryMetadata =
        serde_json::from_str(&fs::read_to_string(dir.join(METADATA_FILE))?).map_err(invalid_data)?;

    let reader = BufReader::new(File::open(dir.join(RECORDS_FILE))?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line).map_err(invalid_data)?);
    }
    Ok((records, metadata))
}

fn invalid_data(e: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Preset;
    use crate::rl::policy::{RandomPolicy, ReadinessPolicy};
    use crate::rl::runner::{evaluate, EvalConfig};
    use crate::testkit::shared_scenario_store;

    #[test]
    fn collector_covers_every_episode() {
        let store = shared_scenario_store();
        let collector = TrajectoryCollector::new(Arc::clone(&store), 3, 42);
        let (records, metadata) = collector.collect(7, ReadinessPolicy::new).unwrap();

        assert_eq!(metadata.num_episodes, 7);
        assert_eq!(metadata.num_transitions, records.len() as u64);
        assert_eq!(metadata.obs_dim, observation_dim(&store));
        assert_eq!(metadata.action_dim, 4);
        assert_eq!(metadata.config_fingerprint, store.fingerprint());

        let ends: Vec<u32> = records
            .iter()
            .filter(|r| r.terminated || r.truncated)
            .map(|r| r.episode_idx)
            .collect();
        assert_eq!(ends.len(), 7);
        assert!(records.iter().all(|r| r.obs_features.len() == metadata.obs_dim));
        assert!(records
            .iter()
            .all(|r| r.step_idx < store.max_turns() && r.action < 4));
    }

    #[test]
    fn collection_is_deterministic_across_batch_widths() {
        let store = Arc::new(ConfigStore::from_preset(Preset::Appointment).unwrap());
        let sort = |mut v: Vec<TrajectoryRecord>| {
            v.sort_by_key(|r| (r.episode_idx, r.step_idx));
            v
        };
        let (a, _) = TrajectoryCollector::new(Arc::clone(&store), 1, 5)
            .collect(6, || RandomPolicy::new(0))
            .unwrap();
        let (b, _) = TrajectoryCollector::new(Arc::clone(&store), 4, 5)
            .collect(6, || RandomPolicy::new(0))
            .unwrap();
        assert_eq!(sort(a), sort(b));
    }

    #[test]
    fn collected_actions_match_evaluation() {
        let store = shared_scenario_store();
        let (records, _) = TrajectoryCollector::new(Arc::clone(&store), 2, 9)
            .collect(5, || RandomPolicy::new(0))
            .unwrap();
        let cfg = EvalConfig {
            episodes: 5,
            base_seed: 9,
            threads: 1,
            persona: None,
        };
        let (_, episodes) = evaluate(store, || RandomPolicy::new(0), &cfg).unwrap();
        for ep in episodes {
            let mut steps: Vec<&TrajectoryRecord> = records
                .iter()
                .filter(|r| r.episode_idx as u64 == ep.episode_id)
                .collect();
            steps.sort_by_key(|r| r.step_idx);
            let actions: Vec<usize> = steps.iter().map(|r| r.action).collect();
            assert_eq!(actions, ep.actions);
        }
    }

    #[test]
    fn writer_round_trips_through_jsonl() {
        let store = shared_scenario_store();
        let (records, metadata) = TrajectoryCollector::new(store, 2, 1)
            .collect(3, ReadinessPolicy::new)
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let writer = TrajectoryWriter::new(dir.path().join("out"));
        writer.write(&records, &metadata).unwrap();

        let (read, meta) = read_trajectories(writer.output_dir()).unwrap();
        assert_eq!(read, records);
        assert_eq!(meta, metadata);
    }
}
