// src/config.rs
//
// Declarative environment configuration.
//
// This is the serde-facing shape of a config file (YAML or JSON). It is
// validated and indexed into dense lookup tables by `ConfigStore`; nothing
// in the environment reads `EnvConfig` directly during a step.
//
// Also hosts the preset / environment-variable plumbing used by the CLI and
// the Python bindings:
// - `Preset` + `resolve_effective_preset` (CLI > SALESGYM_PRESET > default)
// - `EnvConfig::apply_env_overrides` (SALESGYM_MAX_TURNS, noise overrides)

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::noise::{NoiseConfig, NoiseSpec};
use crate::presets;

/// Env var selecting the built-in preset.
pub const ENV_PRESET: &str = "SALESGYM_PRESET";
/// Env var overriding `max_turns`.
pub const ENV_MAX_TURNS: &str = "SALESGYM_MAX_TURNS";
/// Env var overriding per-step Gaussian noise std (0 disables).
pub const ENV_STEP_NOISE_STD: &str = "SALESGYM_STEP_NOISE_STD";
/// Env var overriding reset jitter Gaussian std (0 disables).
pub const ENV_INIT_NOISE_STD: &str = "SALESGYM_INIT_NOISE_STD";

/// Upper bound accepted for `max_turns`.
pub const MAX_TURNS_LIMIT: u32 = 1_000;

fn default_version() -> String {
    "1".to_string()
}

fn default_one() -> f64 {
    1.0
}

fn default_history_cap() -> u32 {
    4
}

/// Top-level environment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvConfig {
    /// Short name used in logs and trajectory metadata.
    pub name: String,
    /// Free-form config version.
    #[serde(default = "default_version")]
    pub version: String,
    /// Episode horizon. A step that reaches it without success times out.
    pub max_turns: u32,
    /// Ordered psychological traits. The order fixes the observation layout.
    pub traits: Vec<TraitDef>,
    /// Ordered actions. Index in this list is the action id.
    pub actions: Vec<ActionDef>,
    /// Customer archetypes.
    pub personas: Vec<PersonaDef>,
    /// Ready thresholds (trait id -> minimum value, inclusive).
    pub thresholds: BTreeMap<String, f64>,
    /// Conversation stages, ordered by `until`. Empty means no stage scaling.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<StageDef>,
    #[serde(default)]
    pub noise: NoiseConfig,
    /// Optional logistic booking-probability model (informational only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring: Option<ScoringConfig>,
    #[serde(default)]
    pub observation: ObservationConfig,
    #[serde(default)]
    pub reward: RewardConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TraitDef {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionDef {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Trait id -> delta per application. Missing traits are unaffected.
    #[serde(default)]
    pub effects: BTreeMap<String, f64>,
    /// Scalar applied to every effect of this action.
    #[serde(default = "default_one")]
    pub effectiveness: f64,
    /// Closing actions can end the episode with success.
    #[serde(default)]
    pub closing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersonaDef {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Starting psychology. Must name every trait.
    pub base: BTreeMap<String, f64>,
    /// Per-trait sensitivity (default 1.0).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub trait_weights: BTreeMap<String, f64>,
    /// Per-action receptiveness (default 1.0).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub action_affinity: BTreeMap<String, f64>,
    /// Relative selection weight at reset.
    #[serde(default = "default_one")]
    pub weight: f64,
}

/// A conversation stage covering turn progress up to (excluding) `until`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageDef {
    pub id: String,
    /// Exclusive upper bound on `turn / max_turns`, in (0, 1].
    pub until: f64,
    /// Action id -> effect multiplier while in this stage (default 1.0).
    #[serde(default)]
    pub action_multipliers: BTreeMap<String, f64>,
}

/// `p = 1 / (1 + exp(-(bias + sum(coef[t] * trait[t]))))`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoringConfig {
    #[serde(default)]
    pub bias: f64,
    pub coefficients: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObservationConfig {
    /// Per-action history counts saturate at this value.
    #[serde(default = "default_history_cap")]
    pub history_cap: u32,
    /// Append a one-hot of the last action (extra slot = none yet).
    #[serde(default)]
    pub include_last_action: bool,
    /// Append a one-hot of the persona.
    #[serde(default)]
    pub include_persona: bool,
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            history_cap: default_history_cap(),
            include_last_action: false,
            include_persona: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RewardConfig {
    #[serde(default = "default_one")]
    pub success: f64,
    #[serde(default)]
    pub timeout: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            success: 1.0,
            timeout: 0.0,
        }
    }
}

impl EnvConfig {
    /// Load a config file, choosing the parser by extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let parse: fn(&str) -> Result<Self, ConfigError> = match ext.as_deref() {
            Some("yaml") | Some("yml") => Self::from_yaml_str,
            Some("json") => Self::from_json_str,
            _ => {
                return Err(ConfigError::UnsupportedFormat {
                    path: path.to_path_buf(),
                })
            }
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        parse(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Apply `SALESGYM_*` overrides from the process environment.
    ///
    /// Supported:
    ///   - SALESGYM_MAX_TURNS        (u32, 1..=1000)
    ///   - SALESGYM_STEP_NOISE_STD   (f64, [0, 1]; 0 disables step noise)
    ///   - SALESGYM_INIT_NOISE_STD   (f64, [0, 1]; 0 disables reset jitter)
    ///
    /// Any variable that fails to parse is ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Same as `apply_env_overrides`, reading values through `lookup`.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MAX_TURNS) {
            match raw.trim().parse::<u32>() {
                Ok(v) if (1..=MAX_TURNS_LIMIT).contains(&v) => {
                    tracing::info!(max_turns = v, "{ENV_MAX_TURNS} overrode config");
                    self.max_turns = v;
                }
                _ => {
                    tracing::warn!(
                        value = %raw,
                        current = self.max_turns,
                        "could not parse {ENV_MAX_TURNS}; keeping config value"
                    );
                }
            }
        }

        if let Some(spec) = parse_noise_override(ENV_STEP_NOISE_STD, lookup(ENV_STEP_NOISE_STD)) {
            tracing::info!(?spec, "{ENV_STEP_NOISE_STD} overrode config");
            self.noise.step = spec;
        }
        if let Some(spec) = parse_noise_override(ENV_INIT_NOISE_STD, lookup(ENV_INIT_NOISE_STD)) {
            tracing::info!(?spec, "{ENV_INIT_NOISE_STD} overrode config");
            self.noise.initial = spec;
        }
    }
}

fn parse_noise_override(key: &str, raw: Option<String>) -> Option<NoiseSpec> {
    let raw = raw?;
    match raw.trim().parse::<f64>() {
        Ok(std) if std == 0.0 => Some(NoiseSpec::None),
        Ok(std) if std.is_finite() && std > 0.0 && std <= 1.0 => {
            Some(NoiseSpec::Gaussian { std, clip: None })
        }
        _ => {
            tracing::warn!(value = %raw, "could not parse {key} as a std in [0, 1]; ignoring");
            None
        }
    }
}

/// Built-in configuration preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    /// Automotive appointment booking with sales tactics.
    #[default]
    Appointment,
    /// Prompt construction with stage-scaled components.
    Prompt,
}

impl Preset {
    pub const ALL: [Preset; 2] = [Preset::Appointment, Preset::Prompt];

    /// Return a stable lowercase name for the preset (used in logs/metadata).
    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Appointment => "appointment",
            Preset::Prompt => "prompt",
        }
    }

    /// Parse a preset name (case-insensitive). Returns None if unrecognized.
    pub fn parse(s: &str) -> Option<Preset> {
        match s.trim().to_ascii_lowercase().as_str() {
            "appointment" | "appt" | "sales" => Some(Preset::Appointment),
            "prompt" | "prompts" => Some(Preset::Prompt),
            _ => None,
        }
    }

    /// Build the preset's configuration.
    pub fn config(&self) -> EnvConfig {
        match self {
            Preset::Appointment => presets::appointment(),
            Preset::Prompt => presets::prompt(),
        }
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the effective preset came from.
///
/// Precedence order (highest to lowest):
/// 1. CLI argument (--preset)
/// 2. Environment variable (SALESGYM_PRESET)
/// 3. Default (appointment)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetSource {
    Cli,
    Env,
    Default,
}

impl PresetSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresetSource::Cli => "cli",
            PresetSource::Env => "env",
            PresetSource::Default => "default",
        }
    }
}

/// Resolved preset with its source for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectivePreset {
    pub preset: Preset,
    pub source: PresetSource,
}

impl EffectivePreset {
    /// Log the effective preset at startup.
    pub fn log_startup(&self) {
        tracing::info!(
            effective_preset = self.preset.as_str(),
            source = self.source.as_str(),
            "resolved preset"
        );
    }
}

/// Resolve the effective preset: CLI, then SALESGYM_PRESET, then default.
pub fn resolve_effective_preset(cli_preset: Option<Preset>) -> EffectivePreset {
    resolve_effective_preset_with(cli_preset, std::env::var(ENV_PRESET).ok())
}

/// Same as `resolve_effective_preset` with an explicit env value.
pub fn resolve_effective_preset_with(
    cli_preset: Option<Preset>,
    env_value: Option<String>,
) -> EffectivePreset {
    if let Some(preset) = cli_preset {
        return EffectivePreset {
            preset,
            source: PresetSource::Cli,
        };
    }

    if let Some(env_val) = env_value {
        if !env_val.is_empty() {
            if let Some(preset) = Preset::parse(&env_val) {
                return EffectivePreset {
                    preset,
                    source: PresetSource::Env,
                };
            }
            // Non-empty but unparseable: warn and fall through
            tracing::warn!(value = %env_val, "invalid {ENV_PRESET}; ignoring");
        }
    }

    EffectivePreset {
        preset: Preset::default(),
        source: PresetSource::Default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn preset_parse_is_case_insensitive() {
        assert_eq!(Preset::parse(" Prompt "), Some(Preset::Prompt));
        assert_eq!(Preset::parse("APPOINTMENT"), Some(Preset::Appointment));
        assert_eq!(Preset::parse("nope"), None);
        for p in Preset::ALL {
            assert_eq!(Preset::parse(p.as_str()), Some(p));
        }
    }

    #[test]
    fn cli_beats_env_beats_default() {
        let eff = resolve_effective_preset_with(Some(Preset::Prompt), Some("appointment".into()));
        assert_eq!(eff.source, PresetSource::Cli);
        assert_eq!(eff.preset, Preset::Prompt);

        let eff = resolve_effective_preset_with(None, Some("prompt".into()));
        assert_eq!(eff.source, PresetSource::Env);
        assert_eq!(eff.preset, Preset::Prompt);

        let eff = resolve_effective_preset_with(None, Some("garbage".into()));
        assert_eq!(eff.source, PresetSource::Default);
        assert_eq!(eff.preset, Preset::Appointment);

        let eff = resolve_effective_preset_with(None, None);
        assert_eq!(eff.source, PresetSource::Default);
    }

    #[test]
    fn overrides_apply_and_ignore_garbage() {
        let mut cfg = Preset::Appointment.config();
        cfg.apply_overrides_from(lookup(&[
            (ENV_MAX_TURNS, "20"),
            (ENV_STEP_NOISE_STD, "0"),
            (ENV_INIT_NOISE_STD, "0.05"),
        ]));
        assert_eq!(cfg.max_turns, 20);
        assert_eq!(cfg.noise.step, NoiseSpec::None);
        assert_eq!(
            cfg.noise.initial,
            NoiseSpec::Gaussian {
                std: 0.05,
                clip: None
            }
        );

        let before = cfg.clone();
        cfg.apply_overrides_from(lookup(&[
            (ENV_MAX_TURNS, "0"),
            (ENV_STEP_NOISE_STD, "-1"),
            (ENV_INIT_NOISE_STD, "abc"),
        ]));
        assert_eq!(cfg, before);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let yaml = "name: x\nmax_turns: 3\ntraits: []\nactions: []\npersonas: []\nthresholds: {}\nbogus: 1\n";
        assert!(matches!(
            EnvConfig::from_yaml_str(yaml),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn defaults_fill_optional_sections() {
        let yaml = r#"
name: tiny
max_turns: 4
traits:
  - id: interest
actions:
  - id: ask
    effects: { interest: 0.1 }
    closing: true
personas:
  - id: p
    base: { interest: 0.2 }
thresholds: { interest: 0.5 }
"#;
        let cfg = EnvConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.version, "1");
        assert_eq!(cfg.actions[0].effectiveness, 1.0);
        assert_eq!(cfg.personas[0].weight, 1.0);
        assert_eq!(cfg.observation, ObservationConfig::default());
        assert_eq!(cfg.reward, RewardConfig::default());
        assert_eq!(cfg.noise, NoiseConfig::default());
        assert!(cfg.stages.is_empty());
    }

    #[test]
    fn yaml_and_json_agree() {
        let cfg = Preset::Prompt.config();
        let yaml = cfg.to_yaml_string().unwrap();
        let json = cfg.to_json_pretty().unwrap();
        assert_eq!(EnvConfig::from_yaml_str(&yaml).unwrap(), cfg);
        assert_eq!(EnvConfig::from_json_str(&json).unwrap(), cfg);
    }

    #[test]
    fn load_rejects_unknown_extension() {
        let err = EnvConfig::load("config.toml").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat { .. }));
    }
}
