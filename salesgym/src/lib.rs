//! salesgym core library.
//!
//! A Gym-style environment for sequential persuasion: an agent picks one
//! discrete action (a sales tactic, a prompt component) per turn, a
//! simulated counterpart's psychological traits move in response, and the
//! episode ends in success when a closing action lands with every ready
//! threshold met, or in timeout at `max_turns`.
//!
//! # Layout
//!
//! - **Configuration** (`config`, `presets`, `store`): YAML/JSON configs
//!   and built-in presets, validated once into an immutable `ConfigStore`
//!   of dense tables shared through `Arc`.
//! - **Dynamics** (`transition`, `noise`, `termination`, `scoring`):
//!   pure functions over the store and a seeded RNG.
//! - **Episode** (`state`, `transcript`): per-episode mutable state and its
//!   read-only summary.
//! - **RL surface** (`rl`): `ConversationEnv`, `VecEnv`, observation
//!   encoding, baseline policies, evaluation and trajectory export.
//! - **Telemetry** (`telemetry`): optional JSONL records.
//!
//! The binary (`src/main.rs`) is a thin CLI over these components.

pub mod config;
pub mod error;
pub mod noise;
pub mod presets;
pub mod rl;
pub mod scoring;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod termination;
pub mod transcript;
pub mod transition;

#[cfg(test)]
pub(crate) mod testkit;

// --- Re-exports for ergonomic external use ---------------------------------

pub use config::{
    resolve_effective_preset, resolve_effective_preset_with, EffectivePreset, EnvConfig, Preset,
    PresetSource,
};
pub use error::{ConfigError, EnvError};
pub use noise::{NoiseConfig, NoiseSpec};
pub use rl::{
    evaluate, run_episode, ConversationEnv, EpisodeSummary, EvalConfig, EvalSummary, Observation,
    Policy, RandomPolicy, ReadinessPolicy, ResetResult, ScriptedPolicy, StepResult, VecEnv,
};
pub use state::EpisodeState;
pub use store::ConfigStore;
pub use telemetry::TelemetrySink;
pub use termination::EpisodePhase;
pub use transcript::{Transcript, TranscriptTurn};
