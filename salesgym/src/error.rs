// src/error.rs
//
// Error taxonomy for configuration loading and episode stepping.
//
// - ConfigError: malformed or inconsistent configuration, raised at load time.
// - EnvError: per-call contract violations from reset/step.
//
// Neither is retryable: both indicate caller or configuration misuse.

use std::path::PathBuf;

use crate::termination::EpisodePhase;

/// Errors raised while loading or validating a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Failed to parse JSON content.
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// File extension is neither YAML nor JSON.
    #[error("unsupported config format for '{}' (expected .yaml, .yml or .json)", path.display())]
    UnsupportedFormat { path: PathBuf },

    /// A required collection is empty.
    #[error("config must declare at least one {what}")]
    Empty { what: &'static str },

    /// Two entries share an id.
    #[error("duplicate {kind} id '{id}'")]
    Duplicate { kind: &'static str, id: String },

    /// A map key references a trait that is not declared.
    #[error("{context} references unknown trait '{trait_id}'")]
    UnknownTrait { context: String, trait_id: String },

    /// A map key references an action that is not declared.
    #[error("{context} references unknown action '{action_id}'")]
    UnknownAction { context: String, action_id: String },

    /// A persona base vector omits a declared trait.
    #[error("persona '{persona}' base psychology is missing trait '{trait_id}'")]
    MissingTrait { persona: String, trait_id: String },

    /// A numeric value is non-finite or outside its allowed range.
    #[error("{field} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Any other structural problem.
    #[error("invalid config field '{field}': {message}")]
    Invalid { field: String, message: String },
}

/// Errors raised by `reset` / `step`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnvError {
    /// Action id outside `0..action_count`.
    #[error("invalid action {action}: action space has {action_count} actions")]
    InvalidAction { action: usize, action_count: usize },

    /// `step` called after the episode reached a terminal phase.
    #[error("episode already ended at turn {turn} ({phase:?}); call reset first")]
    EpisodeEnded { turn: u32, phase: EpisodePhase },

    /// A trait left [0, 1] after clipping. Indicates a broken effect table.
    #[error("trait '{trait_id}' = {value} violates the [0, 1] invariant")]
    NumericInvariantViolation { trait_id: String, value: f64 },

    /// Persona override does not name a configured persona.
    #[error("unknown persona '{0}'")]
    UnknownPersona(String),

    /// Batched step received the wrong number of actions.
    #[error("expected {expected} actions, got {got}")]
    BatchSize { expected: usize, got: usize },
}
