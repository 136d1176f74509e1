// src/store.rs
//
// ConfigStore: validated, indexed, immutable view of an `EnvConfig`.
//
// All cross references (trait ids, action ids) are resolved once here into
// dense vectors so the step function is pure array arithmetic. Construction
// fails fast on any inconsistency; after that the store is read-only and is
// shared between environments through `Arc<ConfigStore>`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::config::{
    EnvConfig, ObservationConfig, Preset, RewardConfig, ScoringConfig, MAX_TURNS_LIMIT,
};
use crate::error::ConfigError;
use crate::noise::NoiseConfig;

/// Bound on multiplicative factors (effectiveness, weights, affinities).
pub const MAX_SCALE: f64 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub struct TraitSpec {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionSpec {
    pub id: String,
    pub label: String,
    /// Delta per trait, in trait order.
    pub effects: Vec<f64>,
    pub effectiveness: f64,
    pub closing: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersonaSpec {
    pub id: String,
    pub label: String,
    /// Base psychology, in trait order.
    pub base: Vec<f64>,
    /// Per-trait weight, in trait order.
    pub trait_weights: Vec<f64>,
    /// Per-action affinity, in action order.
    pub action_affinity: Vec<f64>,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdSpec {
    pub trait_index: usize,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageSpec {
    pub id: String,
    pub until: f64,
    /// Multiplier per action, in action order.
    pub multipliers: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoringSpec {
    pub bias: f64,
    /// Coefficient per trait, in trait order.
    pub coefficients: Vec<f64>,
}

/// Validated configuration with dense lookup tables.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    config: EnvConfig,
    traits: Vec<TraitSpec>,
    actions: Vec<ActionSpec>,
    personas: Vec<PersonaSpec>,
    thresholds: Vec<ThresholdSpec>,
    stages: Vec<StageSpec>,
    scoring: Option<ScoringSpec>,
    closing: Vec<usize>,
    action_index: HashMap<String, usize>,
    persona_index: HashMap<String, usize>,
    persona_dist: WeightedIndex<f64>,
    fingerprint: String,
}

impl ConfigStore {
    /// Validate and index a configuration.
    pub fn new(config: EnvConfig) -> Result<Self, ConfigError> {
        if config.max_turns == 0 || config.max_turns > MAX_TURNS_LIMIT {
            return Err(ConfigError::OutOfRange {
                field: "max_turns".to_string(),
                value: f64::from(config.max_turns),
                min: 1.0,
                max: f64::from(MAX_TURNS_LIMIT),
            });
        }

        // --- traits ---
        if config.traits.is_empty() {
            return Err(ConfigError::Empty { what: "trait" });
        }
        let trait_index = index_ids("trait", config.traits.iter().map(|t| t.id.as_str()))?;
        let traits: Vec<TraitSpec> = config
            .traits
            .iter()
            .map(|t| TraitSpec {
                id: t.id.clone(),
                label: label_or_id(&t.label, &t.id),
            })
            .collect();

        // --- actions ---
        if config.actions.is_empty() {
            return Err(ConfigError::Empty { what: "action" });
        }
        let action_index = index_ids("action", config.actions.iter().map(|a| a.id.as_str()))?;
        let mut actions = Vec::with_capacity(config.actions.len());
        for a in &config.actions {
            let context = format!("action '{}'", a.id);
            let effects = dense_traits(&context, &trait_index, &a.effects, 0.0, -1.0, 1.0)?;
            check_range(&format!("{context}.effectiveness"), a.effectiveness, 0.0, MAX_SCALE)?;
            actions.push(ActionSpec {
                id: a.id.clone(),
                label: label_or_id(&a.label, &a.id),
                effects,
                effectiveness: a.effectiveness,
                closing: a.closing,
            });
        }
        let closing: Vec<usize> = actions
            .iter()
            .enumerate()
            .filter(|(_, a)| a.closing)
            .map(|(i, _)| i)
            .collect();
        if closing.is_empty() {
            return Err(ConfigError::Empty {
                what: "closing action",
            });
        }

        // --- personas ---
        if config.personas.is_empty() {
            return Err(ConfigError::Empty { what: "persona" });
        }
        let persona_index = index_ids("persona", config.personas.iter().map(|p| p.id.as_str()))?;
        let mut personas = Vec::with_capacity(config.personas.len());
        for p in &config.personas {
            let context = format!("persona '{}'", p.id);
            for t in &traits {
                if !p.base.contains_key(&t.id) {
                    return Err(ConfigError::MissingTrait {
                        persona: p.id.clone(),
                        trait_id: t.id.clone(),
                    });
                }
            }
            let base = dense_traits(&format!("{context}.base"), &trait_index, &p.base, 0.0, 0.0, 1.0)?;
            let trait_weights = dense_traits(
                &format!("{context}.trait_weights"),
                &trait_index,
                &p.trait_weights,
                1.0,
                0.0,
                MAX_SCALE,
            )?;
            let action_affinity = dense_actions(
                &format!("{context}.action_affinity"),
                &action_index,
                &p.action_affinity,
                1.0,
            )?;
            check_range(&format!("{context}.weight"), p.weight, 0.0, 1e6)?;
            personas.push(PersonaSpec {
                id: p.id.clone(),
                label: label_or_id(&p.label, &p.id),
                base,
                trait_weights,
                action_affinity,
                weight: p.weight,
            });
        }
        let persona_dist = WeightedIndex::new(personas.iter().map(|p| p.weight)).map_err(|e| {
            ConfigError::Invalid {
                field: "personas.weight".to_string(),
                message: e.to_string(),
            }
        })?;

        // --- thresholds ---
        if config.thresholds.is_empty() {
            return Err(ConfigError::Empty {
                what: "ready threshold",
            });
        }
        let mut thresholds = Vec::with_capacity(config.thresholds.len());
        for (trait_id, value) in &config.thresholds {
            let Some(&idx) = trait_index.get(trait_id.as_str()) else {
                return Err(ConfigError::UnknownTrait {
                    context: "thresholds".to_string(),
                    trait_id: trait_id.clone(),
                });
            };
            check_range(&format!("thresholds.{trait_id}"), *value, 0.0, 1.0)?;
            thresholds.push(ThresholdSpec {
                trait_index: idx,
                value: *value,
            });
        }
        // Trait order, not map order.
        thresholds.sort_by_key(|t| t.trait_index);

        // --- stages ---
        let mut stages = Vec::with_capacity(config.stages.len());
        let mut seen_stage = HashSet::new();
        let mut prev_until = 0.0;
        for s in &config.stages {
            if !seen_stage.insert(s.id.as_str()) {
                return Err(ConfigError::Duplicate {
                    kind: "stage",
                    id: s.id.clone(),
                });
            }
            let field = format!("stage '{}'.until", s.id);
            check_range(&field, s.until, 0.0, 1.0)?;
            if s.until <= prev_until {
                return Err(ConfigError::Invalid {
                    field,
                    message: "stage bounds must be strictly increasing and positive".to_string(),
                });
            }
            prev_until = s.until;
            let multipliers = dense_actions(
                &format!("stage '{}'.action_multipliers", s.id),
                &action_index,
                &s.action_multipliers,
                1.0,
            )?;
            stages.push(StageSpec {
                id: s.id.clone(),
                until: s.until,
                multipliers,
            });
        }
        if let Some(last) = stages.last() {
            if last.until < 1.0 {
                return Err(ConfigError::Invalid {
                    field: format!("stage '{}'.until", last.id),
                    message: "last stage must extend to 1.0".to_string(),
                });
            }
        }

        // --- noise / scoring / observation / reward ---
        config.noise.validate()?;
        let scoring = config
            .scoring
            .as_ref()
            .map(|s| dense_scoring(&trait_index, s))
            .transpose()?;
        if config.observation.history_cap == 0 {
            return Err(ConfigError::Invalid {
                field: "observation.history_cap".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        for (field, value) in [
            ("reward.success", config.reward.success),
            ("reward.timeout", config.reward.timeout),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::Invalid {
                    field: field.to_string(),
                    message: "must be finite".to_string(),
                });
            }
        }

        let fingerprint = fingerprint_config(&config)?;
        let action_index = owned_index(action_index);
        let persona_index = owned_index(persona_index);

        Ok(Self {
            config,
            traits,
            actions,
            personas,
            thresholds,
            stages,
            scoring,
            closing,
            action_index,
            persona_index,
            persona_dist,
            fingerprint,
        })
    }

    /// Load, validate and index a YAML or JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::new(EnvConfig::load(path)?)
    }

    /// Store for a built-in preset.
    pub fn from_preset(preset: Preset) -> Result<Self, ConfigError> {
        Self::new(preset.config())
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// `sha256:<hex>` over the canonical JSON form of the config.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn traits(&self) -> &[TraitSpec] {
        &self.traits
    }

    pub fn trait_count(&self) -> usize {
        self.traits.len()
    }

    pub fn trait_names(&self) -> Vec<&str> {
        self.traits.iter().map(|t| t.id.as_str()).collect()
    }

    pub fn actions(&self) -> &[ActionSpec] {
        &self.actions
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    pub fn action(&self, index: usize) -> Option<&ActionSpec> {
        self.actions.get(index)
    }

    pub fn action_index(&self, id: &str) -> Option<usize> {
        self.action_index.get(id).copied()
    }

    /// Effect row for an action, in trait order.
    pub fn effects(&self, action: usize) -> Option<&[f64]> {
        self.actions.get(action).map(|a| a.effects.as_slice())
    }

    pub fn is_closing(&self, action: usize) -> bool {
        self.actions.get(action).is_some_and(|a| a.closing)
    }

    pub fn closing_actions(&self) -> &[usize] {
        &self.closing
    }

    pub fn personas(&self) -> &[PersonaSpec] {
        &self.personas
    }

    pub fn persona_count(&self) -> usize {
        self.personas.len()
    }

    pub fn persona(&self, index: usize) -> Option<&PersonaSpec> {
        self.personas.get(index)
    }

    pub fn persona_index(&self, id: &str) -> Option<usize> {
        self.persona_index.get(id).copied()
    }

    /// Draw a persona index from the configured selection weights.
    pub fn sample_persona<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        self.persona_dist.sample(rng)
    }

    /// Ready thresholds, in trait order.
    pub fn thresholds(&self) -> &[ThresholdSpec] {
        &self.thresholds
    }

    pub fn max_turns(&self) -> u32 {
        self.config.max_turns
    }

    pub fn noise(&self) -> &NoiseConfig {
        &self.config.noise
    }

    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Stage active for a step taken at `turn` (before the counter advances).
    ///
    /// Returns the first stage whose bound exceeds `turn / max_turns`, or
    /// None when no stages are configured.
    pub fn stage_index_for_turn(&self, turn: u32) -> Option<usize> {
        if self.stages.is_empty() {
            return None;
        }
        let progress = f64::from(turn) / f64::from(self.config.max_turns);
        let idx = self
            .stages
            .iter()
            .position(|s| progress < s.until)
            .unwrap_or(self.stages.len() - 1);
        Some(idx)
    }

    pub fn scoring(&self) -> Option<&ScoringSpec> {
        self.scoring.as_ref()
    }

    pub fn observation(&self) -> &ObservationConfig {
        &self.config.observation
    }

    pub fn reward(&self) -> &RewardConfig {
        &self.config.reward
    }
}

fn label_or_id(label: &str, id: &str) -> String {
    if label.is_empty() {
        id.to_string()
    } else {
        label.to_string()
    }
}

fn index_ids<'a>(
    kind: &'static str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<HashMap<&'a str, usize>, ConfigError> {
    let mut index = HashMap::new();
    for (i, id) in ids.enumerate() {
        if id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: format!("{kind}[{i}].id"),
                message: "id must not be empty".to_string(),
            });
        }
        if index.insert(id, i).is_some() {
            return Err(ConfigError::Duplicate {
                kind,
                id: id.to_string(),
            });
        }
    }
    Ok(index)
}

fn owned_index(index: HashMap<&str, usize>) -> HashMap<String, usize> {
    index.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn check_range(field: &str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field: field.to_string(),
            value,
            min,
            max,
        })
    }
}

fn dense_traits(
    context: &str,
    trait_index: &HashMap<&str, usize>,
    values: &BTreeMap<String, f64>,
    default: f64,
    min: f64,
    max: f64,
) -> Result<Vec<f64>, ConfigError> {
    let mut out = vec![default; trait_index.len()];
    for (trait_id, value) in values {
        let Some(&idx) = trait_index.get(trait_id.as_str()) else {
            return Err(ConfigError::UnknownTrait {
                context: context.to_string(),
                trait_id: trait_id.clone(),
            });
        };
        check_range(&format!("{context}.{trait_id}"), *value, min, max)?;
        out[idx] = *value;
    }
    Ok(out)
}

fn dense_actions(
    context: &str,
    action_index: &HashMap<&str, usize>,
    values: &BTreeMap<String, f64>,
    default: f64,
) -> Result<Vec<f64>, ConfigError> {
    let mut out = vec![default; action_index.len()];
    for (action_id, value) in values {
        let Some(&idx) = action_index.get(action_id.as_str()) else {
            return Err(ConfigError::UnknownAction {
                context: context.to_string(),
                action_id: action_id.clone(),
            });
        };
        check_range(&format!("{context}.{action_id}"), *value, 0.0, MAX_SCALE)?;
        out[idx] = *value;
    }
    Ok(out)
}

fn dense_scoring(
    trait_index: &HashMap<&str, usize>,
    scoring: &ScoringConfig,
) -> Result<ScoringSpec, ConfigError> {
    check_range("scoring.bias", scoring.bias, -100.0, 100.0)?;
    let coefficients = dense_traits(
        "scoring.coefficients",
        trait_index,
        &scoring.coefficients,
        0.0,
        -100.0,
        100.0,
    )?;
    Ok(ScoringSpec {
        bias: scoring.bias,
        coefficients,
    })
}

fn fingerprint_config(config: &EnvConfig) -> Result<String, ConfigError> {
    let bytes = serde_json::to_vec(config)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("sha256:{}", hex_encode(&digest)))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::scenario_config;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn presets_validate() {
        for preset in Preset::ALL {
            let store = ConfigStore::from_preset(preset).unwrap();
            assert_eq!(store.trait_count(), 5);
            assert!(!store.closing_actions().is_empty());
            assert!(store.fingerprint().starts_with("sha256:"));
            assert_eq!(store.fingerprint().len(), "sha256:".len() + 64);
        }
    }

    #[test]
    fn dense_tables_follow_declaration_order() {
        let store = ConfigStore::new(scenario_config()).unwrap();
        assert_eq!(store.trait_names(), vec!["interest", "trust", "commitment"]);
        let pitch = store.action_index("pitch").unwrap();
        assert_eq!(store.effects(pitch), Some(&[0.12, 0.05, 0.0][..]));
        let idx: Vec<usize> = store.thresholds().iter().map(|t| t.trait_index).collect();
        assert_eq!(idx, vec![0, 1, 2]);
        assert_eq!(store.closing_actions(), &[store.action_index("close").unwrap()]);
    }

    #[test]
    fn id_lookups_outlive_the_source_config() {
        let cfg = scenario_config();
        let ids: Vec<String> = cfg.actions.iter().map(|a| a.id.clone()).collect();
        let personas: Vec<String> = cfg.personas.iter().map(|p| p.id.clone()).collect();
        let store = ConfigStore::new(cfg).unwrap();
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(store.action_index(id), Some(i));
        }
        for (i, id) in personas.iter().enumerate() {
            assert_eq!(store.persona_index(id), Some(i));
        }
        assert_eq!(store.action_index("dance"), None);
        assert_eq!(store.persona_index("nobody"), None);
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = ConfigStore::new(scenario_config()).unwrap();
        let b = ConfigStore::new(scenario_config()).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let mut cfg = scenario_config();
        cfg.max_turns = 11;
        let c = ConfigStore::new(cfg).unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn rejects_unknown_trait_in_effects() {
        let mut cfg = scenario_config();
        cfg.actions[0].effects.insert("patience".into(), 0.1);
        let err = ConfigStore::new(cfg).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTrait { ref trait_id, .. } if trait_id == "patience"));
    }

    #[test]
    fn rejects_incomplete_persona_base() {
        let mut cfg = scenario_config();
        cfg.personas[0].base.remove("trust");
        let err = ConfigStore::new(cfg).unwrap_err();
        assert!(matches!(err, ConfigError::MissingTrait { ref trait_id, .. } if trait_id == "trust"));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut cfg = scenario_config();
        cfg.thresholds.insert("interest".into(), 1.5);
        assert!(matches!(
            ConfigStore::new(cfg),
            Err(ConfigError::OutOfRange { .. })
        ));

        let mut cfg = scenario_config();
        cfg.personas[0].base.insert("interest".into(), -0.1);
        assert!(matches!(
            ConfigStore::new(cfg),
            Err(ConfigError::OutOfRange { .. })
        ));

        let mut cfg = scenario_config();
        cfg.actions[0].effects.insert("interest".into(), f64::NAN);
        assert!(matches!(
            ConfigStore::new(cfg),
            Err(ConfigError::OutOfRange { .. })
        ));
    }

    #[test]
    fn rejects_structural_problems() {
        let mut cfg = scenario_config();
        cfg.actions.iter_mut().for_each(|a| a.closing = false);
        assert!(matches!(
            ConfigStore::new(cfg),
            Err(ConfigError::Empty { what: "closing action" })
        ));

        let mut cfg = scenario_config();
        let dup = cfg.actions[0].clone();
        cfg.actions.push(dup);
        assert!(matches!(
            ConfigStore::new(cfg),
            Err(ConfigError::Duplicate { kind: "action", .. })
        ));

        let mut cfg = scenario_config();
        cfg.max_turns = 0;
        assert!(matches!(
            ConfigStore::new(cfg),
            Err(ConfigError::OutOfRange { .. })
        ));

        let mut cfg = scenario_config();
        cfg.personas.iter_mut().for_each(|p| p.weight = 0.0);
        assert!(matches!(
            ConfigStore::new(cfg),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn rejects_bad_stage_bounds() {
        let mut cfg = crate::presets::prompt();
        cfg.stages.swap(0, 1);
        assert!(matches!(
            ConfigStore::new(cfg),
            Err(ConfigError::Invalid { .. })
        ));

        let mut cfg = crate::presets::prompt();
        cfg.stages.pop();
        assert!(matches!(
            ConfigStore::new(cfg),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn stage_lookup_uses_turn_progress() {
        let store = ConfigStore::from_preset(Preset::Prompt).unwrap();
        // max_turns = 12: 0..=2 early, 3..=5 middle, 6..=8 late, 9..=11 closing
        let ids: Vec<&str> = (0..12)
            .map(|t| store.stages()[store.stage_index_for_turn(t).unwrap()].id.as_str())
            .collect();
        assert_eq!(&ids[..3], &["early"; 3]);
        assert_eq!(&ids[3..6], &["middle"; 3]);
        assert_eq!(&ids[6..9], &["late"; 3]);
        assert_eq!(&ids[9..], &["closing"; 3]);

        let plain = ConfigStore::new(scenario_config()).unwrap();
        assert_eq!(plain.stage_index_for_turn(0), None);
    }

    #[test]
    fn persona_weights_shape_the_draw() {
        let mut cfg = scenario_config();
        cfg.personas[0].weight = 0.0;
        let store = ConfigStore::new(cfg).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..200 {
            assert_ne!(store.sample_persona(&mut rng), 0);
        }
    }

    #[test]
    fn store_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ConfigStore>();
    }
}
