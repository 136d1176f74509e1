// src/rl/observation.rs
//
// Versioned observation schema and flat feature encoding.
//
// Two views of the same episode state:
// - Observation: structured, serde, canonical JSON for logging / replay.
// - encode_observation: flat f32 vector for a learning optimizer.
//
// Flat layout (all values in [0, 1]):
//   [traits..., turn / max_turns, min(count, cap) / cap per action,
//    last-action one-hot (action_count + 1, last slot = none)?,
//    persona one-hot (persona_count)?]
//
// The layout depends only on the config. Changing traits, actions or (when
// one-hot encoded) personas changes the shape; OBS_VERSION covers changes to
// the layout rules themselves.

use serde::{Deserialize, Serialize};

use crate::state::EpisodeState;
use crate::store::ConfigStore;
use crate::termination::EpisodePhase;

/// Current observation schema version.
/// Increment when adding/removing/changing fields or the flat layout.
pub const OBS_VERSION: u32 = 1;

/// One named trait value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraitObservation {
    pub id: String,
    pub value: f64,
}

/// Structured observation of an episode state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    /// Schema version for forwards/backwards compatibility.
    pub obs_version: u32,
    pub turn: u32,
    pub max_turns: u32,
    /// `turn / max_turns`.
    pub turn_progress: f64,
    pub persona_index: usize,
    pub persona_id: String,
    /// Trait values in config order.
    pub traits: Vec<TraitObservation>,
    /// Raw per-action counts in action order.
    pub action_counts: Vec<u32>,
    pub last_action: Option<usize>,
    pub phase: EpisodePhase,
}

impl Observation {
    /// Build an Observation from the episode state.
    ///
    /// Pure and deterministic given the same state.
    pub fn from_state(store: &ConfigStore, state: &EpisodeState) -> Self {
        let persona_id = store
            .persona(state.persona)
            .map(|p| p.id.clone())
            .unwrap_or_default();
        let traits = store
            .traits()
            .iter()
            .zip(state.psychology.iter())
            .map(|(t, v)| TraitObservation {
                id: t.id.clone(),
                value: *v,
            })
            .collect();

        Observation {
            obs_version: OBS_VERSION,
            turn: state.turn,
            max_turns: store.max_turns(),
            turn_progress: f64::from(state.turn) / f64::from(store.max_turns()),
            persona_index: state.persona,
            persona_id,
            traits,
            action_counts: state.action_counts.clone(),
            last_action: state.last_action(),
            phase: state.phase,
        }
    }

    /// Serialize to JSON bytes for deterministic comparison.
    ///
    /// Field order is the struct order, so equal observations give equal bytes.
    pub fn to_canonical_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Trait value by id.
    pub fn trait_value(&self, id: &str) -> Option<f64> {
        self.traits.iter().find(|t| t.id == id).map(|t| t.value)
    }

    /// Trait values in config order.
    pub fn trait_values(&self) -> Vec<f64> {
        self.traits.iter().map(|t| t.value).collect()
    }

    /// Flat feature vector for this observation.
    pub fn to_features(&self, store: &ConfigStore) -> Vec<f32> {
        let mut out = Vec::with_capacity(observation_dim(store));
        let values = self.trait_values();
        encode_parts(
            store,
            &values,
            self.turn,
            &self.action_counts,
            self.last_action,
            self.persona_index,
            &mut out,
        );
        out
    }
}

/// Length of the flat feature vector for a config.
pub fn observation_dim(store: &ConfigStore) -> usize {
    let obs = store.observation();
    let mut dim = store.trait_count() + 1 + store.action_count();
    if obs.include_last_action {
        dim += store.action_count() + 1;
    }
    if obs.include_persona {
        dim += store.persona_count();
    }
    dim
}

/// Encode the episode state as a flat f32 vector.
pub fn encode_observation(store: &ConfigStore, state: &EpisodeState) -> Vec<f32> {
    let mut out = Vec::with_capacity(observation_dim(store));
    encode_observation_into(store, state, &mut out);
    out
}

/// Encode into a reusable buffer (cleared first).
pub fn encode_observation_into(store: &ConfigStore, state: &EpisodeState, out: &mut Vec<f32>) {
    out.clear();
    encode_parts(
        store,
        &state.psychology,
        state.turn,
        &state.action_counts,
        state.last_action(),
        state.persona,
        out,
    );
}

fn encode_parts(
    store: &ConfigStore,
    psychology: &[f64],
    turn: u32,
    action_counts: &[u32],
    last_action: Option<usize>,
    persona: usize,
    out: &mut Vec<f32>,
) {
    let obs = store.observation();
    let n_actions = store.action_count();

    out.extend(psychology.iter().map(|v| *v as f32));
    out.push((f64::from(turn) / f64::from(store.max_turns())) as f32);

    let cap = obs.history_cap;
    out.extend(
        action_counts
            .iter()
            .map(|c| (f64::from((*c).min(cap)) / f64::from(cap)) as f32),
    );

    if obs.include_last_action {
        let hot = last_action.unwrap_or(n_actions);
        out.extend((0..=n_actions).map(|i| if i == hot { 1.0 } else { 0.0 }));
    }
    if obs.include_persona {
        out.extend((0..store.persona_count()).map(|i| if i == persona { 1.0 } else { 0.0 }));
    }
}

/// Human-readable name for every slot of the flat vector.
pub fn feature_names(store: &ConfigStore) -> Vec<String> {
    let obs = store.observation();
    let mut names: Vec<String> = store.traits().iter().map(|t| t.id.clone()).collect();
    names.push("turn_progress".to_string());
    names.extend(store.actions().iter().map(|a| format!("count:{}", a.id)));
    if obs.include_last_action {
        names.extend(store.actions().iter().map(|a| format!("last:{}", a.id)));
        names.push("last:none".to_string());
    }
    if obs.include_persona {
        names.extend(store.personas().iter().map(|p| format!("persona:{}", p.id)));
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Preset;
    use crate::testkit::{scenario_config, scenario_store};

    fn sample_state(store: &ConfigStore) -> EpisodeState {
        let mut s = EpisodeState::new(vec![0.3, 0.25, 0.2], 0, store.action_count(), 7);
        s.commit(0, vec![0.42, 0.3, 0.2]);
        s.commit(0, vec![0.54, 0.35, 0.2]);
        s
    }

    #[test]
    fn layout_without_one_hots() {
        let store = scenario_store();
        let f = encode_observation(&store, &sample_state(&store));
        assert_eq!(f.len(), observation_dim(&store));
        assert_eq!(f.len(), 3 + 1 + 4);
        assert_eq!(f[0], 0.54_f32);
        assert_eq!(f[3], (2.0 / 12.0) as f32);
        // default cap 4: two pitches -> 0.5
        assert_eq!(&f[4..], &[0.5, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn counts_saturate_at_cap() {
        let store = scenario_store();
        let mut s = EpisodeState::new(vec![0.3, 0.25, 0.2], 0, 4, 0);
        for _ in 0..7 {
            s.commit(1, vec![0.3, 0.25, 0.2]);
        }
        let f = encode_observation(&store, &s);
        assert_eq!(f[5], 1.0);
    }

    #[test]
    fn one_hots_extend_the_layout() {
        let mut cfg = scenario_config();
        cfg.observation.include_last_action = true;
        cfg.observation.include_persona = true;
        let store = ConfigStore::new(cfg).unwrap();
        let fresh = EpisodeState::new(vec![0.3, 0.25, 0.2], 1, 4, 0);
        let f = encode_observation(&store, &fresh);
        assert_eq!(f.len(), 3 + 1 + 4 + 5 + 2);
        // last-action "none" slot and persona 1
        assert_eq!(&f[8..13], &[0.0, 0.0, 0.0, 0.0, 1.0]);
        assert_eq!(&f[13..], &[0.0, 1.0]);
        assert_eq!(feature_names(&store).len(), f.len());
    }

    #[test]
    fn structured_and_flat_views_agree() {
        let store = ConfigStore::from_preset(Preset::Appointment).unwrap();
        let mut s = EpisodeState::new(vec![0.3, 0.2, 0.4, 0.25, 0.2], 3, 8, 9);
        s.commit(5, vec![0.32, 0.2, 0.4, 0.36, 0.23]);
        let obs = Observation::from_state(&store, &s);
        assert_eq!(obs.to_features(&store), encode_observation(&store, &s));
        assert_eq!(obs.trait_value("trust"), Some(0.36));
        assert_eq!(obs.persona_id, "research_buyer");
    }

    #[test]
    fn canonical_json_is_stable() {
        let store = scenario_store();
        let s = sample_state(&store);
        let a = Observation::from_state(&store, &s).to_canonical_json().unwrap();
        let b = Observation::from_state(&store, &s).to_canonical_json().unwrap();
        assert_eq!(a, b);
        let back: Observation = serde_json::from_slice(&a).unwrap();
        assert_eq!(back, Observation::from_state(&store, &s));
    }

    #[test]
    fn buffer_reuse_matches_fresh_encoding() {
        let store = scenario_store();
        let s = sample_state(&store);
        let mut buf = vec![9.0; 32];
        encode_observation_into(&store, &s, &mut buf);
        assert_eq!(buf, encode_observation(&store, &s));
    }
}
