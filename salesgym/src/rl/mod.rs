// src/rl/mod.rs
//
// Gym-style RL surface over the conversation model.
//
// Key components:
// - Observation: versioned, serializable snapshot plus its flat encoding
// - ConversationEnv / VecEnv: reset/step environments
// - Policy: baseline decision-makers (random, scripted, readiness heuristic)
// - runner: episode driver and threaded batch evaluation
// - trajectory: dataset export for behaviour cloning

pub mod env;
pub mod observation;
pub mod policy;
pub mod runner;
pub mod trajectory;

pub use env::{ConversationEnv, ResetInfo, ResetResult, StepInfo, StepResult, VecEnv};
pub use observation::{
    encode_observation, feature_names, observation_dim, Observation, TraitObservation, OBS_VERSION,
};
pub use policy::{Policy, RandomPolicy, ReadinessPolicy, ScriptedPolicy};
pub use runner::{
    episode_seed, evaluate, run_episode, EpisodeConfig, EpisodeSummary, EvalConfig, EvalSummary,
    PersonaEval,
};
pub use trajectory::{
    read_trajectories, TrajectoryCollector, TrajectoryMetadata, TrajectoryRecord, TrajectoryWriter,
    TRAJECTORY_VERSION,
};
