// src/testkit.rs
//
// Shared fixtures for unit tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{
    ActionDef, EnvConfig, ObservationConfig, PersonaDef, RewardConfig, TraitDef,
};
use crate::noise::NoiseConfig;
use crate::store::ConfigStore;

fn map(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn action(id: &str, effects: &[(&str, f64)], closing: bool) -> ActionDef {
    ActionDef {
        id: id.to_string(),
        label: String::new(),
        description: String::new(),
        effects: map(effects),
        effectiveness: 1.0,
        closing,
    }
}

fn persona(id: &str, base: &[(&str, f64)]) -> PersonaDef {
    PersonaDef {
        id: id.to_string(),
        label: String::new(),
        description: String::new(),
        base: map(base),
        trait_weights: BTreeMap::new(),
        action_affinity: BTreeMap::new(),
        weight: 1.0,
    }
}

/// Three traits, four actions (`close` is closing), two personas,
/// thresholds 0.5 everywhere, 12 turns, no noise.
///
/// From `cautious`, the sequence pitch, pitch, reassure, secure, close
/// clears every threshold on the fifth step.
pub(crate) fn scenario_config() -> EnvConfig {
    EnvConfig {
        name: "scenario".to_string(),
        version: "1".to_string(),
        max_turns: 12,
        traits: ["interest", "trust", "commitment"]
            .iter()
            .map(|id| TraitDef {
                id: id.to_string(),
                label: String::new(),
                description: String::new(),
            })
            .collect(),
        actions: vec![
            action("pitch", &[("interest", 0.12), ("trust", 0.05)], false),
            action("reassure", &[("trust", 0.2)], false),
            action("secure", &[("interest", 0.02), ("commitment", 0.25)], false),
            action("close", &[("commitment", 0.1)], true),
        ],
        personas: vec![
            persona(
                "cautious",
                &[("interest", 0.3), ("trust", 0.25), ("commitment", 0.2)],
            ),
            persona(
                "warm",
                &[("interest", 0.45), ("trust", 0.45), ("commitment", 0.45)],
            ),
        ],
        thresholds: map(&[("interest", 0.5), ("trust", 0.5), ("commitment", 0.5)]),
        stages: Vec::new(),
        noise: NoiseConfig::default(),
        scoring: None,
        observation: ObservationConfig::default(),
        reward: RewardConfig::default(),
    }
}

pub(crate) fn scenario_store() -> ConfigStore {
    match ConfigStore::new(scenario_config()) {
        Ok(store) => store,
        Err(e) => panic!("scenario config must validate: {e}"),
    }
}

pub(crate) fn shared_scenario_store() -> Arc<ConfigStore> {
    Arc::new(scenario_store())
}
